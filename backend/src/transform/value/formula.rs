//! Arithmetic expression engine used by [`Calculate`](super::Calculate).
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('^' unary)?
//! primary := number | constant | function '(' args ')' | '(' expr ')'
//! ```
//!
//! Constants: `pi`, `e`. Functions (case-insensitive): `abs`, `ceiling`,
//! `floor`, `round(x[, n])`, `truncate`, `sqrt`, `pow(x, y)`, `min`, `max`,
//! `exp`, `log(x[, base])`, `log10`, `sign`.

use thiserror::Error;

/// Deepest nesting of parentheses and unary signs accepted.
pub const MAX_DEPTH: usize = 256;

/// Why a formula could not be evaluated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),

    #[error("Unexpected end of formula")]
    UnexpectedEnd,

    #[error("Unexpected token {0}")]
    UnexpectedToken(String),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    WrongArity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("'{0}' is undefined for its argument")]
    Domain(String),

    #[error("Formula nests too deeply (limit: 256 levels)")]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent: 1e3, 2.5E-4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::UnexpectedToken(format!("'{}'", text)))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '+' | '-' | '*' | '/' | '%' | '^' | '(' | ')' | ',' => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '^' => Token::Caret,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => Token::Comma,
                });
                i += 1;
            }
            other => return Err(FormulaError::UnexpectedCharacter(other, i)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(FormulaError::UnexpectedToken(format!("{:?}", token))),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    value /= divisor;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    value %= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    /// Every recursive path of the grammar passes through here.
    fn unary(&mut self) -> Result<f64, FormulaError> {
        if self.depth >= MAX_DEPTH {
            return Err(FormulaError::TooDeep);
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, FormulaError> {
        let base = self.primary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, FormulaError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.pos += 1;
                    let args = self.arguments()?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(FormulaError::UnexpectedToken(format!("{:?}", token))),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    /// Comma-separated arguments, after the opening parenthesis.
    fn arguments(&mut self) -> Result<Vec<f64>, FormulaError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(FormulaError::UnexpectedToken(format!("{:?}", token))),
                None => return Err(FormulaError::UnexpectedEnd),
            }
        }
    }
}

fn constant(name: &str) -> Result<f64, FormulaError> {
    match name.to_lowercase().as_str() {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        _ => Err(FormulaError::UnknownIdentifier(name.to_string())),
    }
}

fn arity(name: &str, args: &[f64], range: std::ops::RangeInclusive<usize>, expected: &'static str) -> Result<(), FormulaError> {
    if range.contains(&args.len()) {
        Ok(())
    } else {
        Err(FormulaError::WrongArity {
            name: name.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, FormulaError> {
    let lower = name.to_lowercase();
    let value = match lower.as_str() {
        "abs" | "ceiling" | "floor" | "truncate" | "sqrt" | "exp" | "log10" | "sign" => {
            arity(name, args, 1..=1, "1")?;
            let x = args[0];
            match lower.as_str() {
                "abs" => x.abs(),
                "ceiling" => x.ceil(),
                "floor" => x.floor(),
                "truncate" => x.trunc(),
                "sqrt" if x < 0.0 => return Err(FormulaError::Domain(name.to_string())),
                "sqrt" => x.sqrt(),
                "exp" => x.exp(),
                "log10" if x <= 0.0 => return Err(FormulaError::Domain(name.to_string())),
                "log10" => x.log10(),
                _ => {
                    if x > 0.0 {
                        1.0
                    } else if x < 0.0 {
                        -1.0
                    } else {
                        0.0
                    }
                }
            }
        }
        "round" => {
            arity(name, args, 1..=2, "1 or 2")?;
            let places = args.get(1).copied().unwrap_or(0.0);
            round_half_even(args[0], places as i32)
        }
        "pow" => {
            arity(name, args, 2..=2, "2")?;
            args[0].powf(args[1])
        }
        "min" | "max" => {
            arity(name, args, 1..=usize::MAX, "at least 1")?;
            let fold: fn(f64, f64) -> f64 = if lower == "min" { f64::min } else { f64::max };
            args[1..].iter().copied().fold(args[0], fold)
        }
        "log" => {
            arity(name, args, 1..=2, "1 or 2")?;
            let x = args[0];
            let base = args.get(1).copied();
            if x <= 0.0 || base.is_some_and(|b| b <= 0.0 || b == 1.0) {
                return Err(FormulaError::Domain(name.to_string()));
            }
            match base {
                Some(b) => x.log(b),
                None => x.ln(),
            }
        }
        _ => return Err(FormulaError::UnknownIdentifier(name.to_string())),
    };

    if value.is_nan() {
        return Err(FormulaError::Domain(name.to_string()));
    }
    Ok(value)
}

/// Round to `places` decimals, ties to even. Negative `places` is a no-op.
pub fn round_half_even(value: f64, places: i32) -> f64 {
    if places < 0 || !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(places);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round_ties_even() / factor
}

/// Evaluate a formula.
///
/// The result may be infinite (overflow); callers decide how to report it.
pub fn evaluate(formula: &str) -> Result<f64, FormulaError> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err(FormulaError::UnexpectedEnd);
    }

    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let value = parser.expr()?;
    match parser.next() {
        None => Ok(value),
        Some(token) => Err(FormulaError::UnexpectedToken(format!("{:?}", token))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(formula: &str) -> f64 {
        evaluate(formula).unwrap()
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("7 % 3"), 1.0);
        assert_eq!(eval("--3"), 3.0);
        assert_eq!(eval("1.5e2 + 5E-1"), 150.5);
    }

    #[test]
    fn test_functions_and_constants() {
        assert_eq!(eval("ABS(-3)"), 3.0);
        assert_eq!(eval("ceiling(1.2) + floor(1.8)"), 3.0);
        assert_eq!(eval("round(2.5)"), 2.0);
        assert_eq!(eval("round(1.2345, 2)"), 1.23);
        assert_eq!(eval("truncate(-1.7)"), -1.0);
        assert_eq!(eval("max(1, 7, 3) - min(4, 2)"), 5.0);
        assert_eq!(eval("pow(2, 10)"), 1024.0);
        assert_eq!(eval("log(8, 2)"), 3.0);
        assert_eq!(eval("log10(1000)"), 3.0);
        assert_eq!(eval("sign(-4)"), -1.0);
        assert!((eval("pi") - std::f64::consts::PI).abs() < 1e-12);
        assert!((eval("log(e)") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate("1 / 0"), Err(FormulaError::DivisionByZero));
        assert_eq!(evaluate("5 % 0"), Err(FormulaError::DivisionByZero));
        assert_eq!(evaluate(""), Err(FormulaError::UnexpectedEnd));
        assert_eq!(evaluate("1 +"), Err(FormulaError::UnexpectedEnd));
        assert!(matches!(evaluate("abc + 1"), Err(FormulaError::UnknownIdentifier(_))));
        assert!(matches!(evaluate("1 # 2"), Err(FormulaError::UnexpectedCharacter('#', 2))));
        assert!(matches!(evaluate("(1 + 2"), Err(FormulaError::UnexpectedEnd)));
        assert!(matches!(evaluate("1 2"), Err(FormulaError::UnexpectedToken(_))));
        assert!(matches!(evaluate("sqrt(-1)"), Err(FormulaError::Domain(_))));
        assert!(matches!(evaluate("pow(1)"), Err(FormulaError::WrongArity { .. })));
        assert!(matches!(evaluate("nope(1)"), Err(FormulaError::UnknownIdentifier(_))));
    }

    #[test]
    fn test_nesting_is_bounded() {
        let nested = |levels: usize| format!("{}1{}", "(".repeat(levels), ")".repeat(levels));
        assert_eq!(eval(&nested(MAX_DEPTH - 1)), 1.0);
        assert_eq!(evaluate(&nested(1000)), Err(FormulaError::TooDeep));

        let signs = |count: usize| format!("{}1", "-".repeat(count));
        assert_eq!(eval(&signs(MAX_DEPTH - 2)), 1.0);
        assert_eq!(evaluate(&signs(2_000_000)), Err(FormulaError::TooDeep));
        assert_eq!(evaluate(&format!("2 ^ {}", signs(5000))), Err(FormulaError::TooDeep));
    }

    #[test]
    fn test_overflow_is_infinite_not_error() {
        assert!(eval("10 ^ 400").is_infinite());
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(0.125, 2), 0.12);
        assert_eq!(round_half_even(33.01, 2), 33.01);
        assert_eq!(round_half_even(3.5, 0), 4.0);
        assert_eq!(round_half_even(4.5, 0), 4.0);
        assert_eq!(round_half_even(1.23456, -1), 1.23456);
    }
}
