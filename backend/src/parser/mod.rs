//! Generic CSV parser with encoding and delimiter auto-detection.
//!
//! Turns raw CSV into a [`Table`]: one [`Record`](crate::models::Record) per
//! data row, and one [`FieldDescriptor`](crate::models::FieldDescriptor) per
//! column carrying its inferred type and distinct values. No mapping logic
//! here.

use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::Table;

/// Candidate delimiters, in tie-break order.
const DELIMITERS: [char; 4] = [';', ',', '\t', '|'];

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed rows and column descriptors
    pub table: Table,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Column headers, in file order
    pub headers: Vec<String>,
}

impl ParseResult {
    pub fn row_count(&self) -> usize {
        self.table.len()
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding.
///
/// Unknown encodings fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    match decoded.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best = DELIMITERS[0];
    let mut best_count = 0;
    for &candidate in &DELIMITERS {
        let count = first_line.matches(candidate).count();
        if count > best_count {
            best_count = count;
            best = candidate;
        }
    }
    best
}

/// Parse CSV text with an explicit delimiter into a table named `name`.
///
/// Fields are trimmed, quoted fields may contain delimiters and newlines,
/// short rows are padded with empty strings and extra cells are dropped.
/// Rows whose cells are all blank are skipped.
///
/// # Example
/// ```
/// use fieldmap::parser::parse_str;
///
/// let table = parse_str("name;age\nAlice;30\nBob;25", ';', "people").unwrap();
/// assert_eq!(table.len(), 2);
/// assert_eq!(table.rows[0].get("name").unwrap(), "Alice");
/// ```
pub fn parse_str(content: &str, delimiter: char, name: &str) -> CsvResult<Table> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| CsvError::new(0, format!("Delimiter '{}' is not a single byte", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(&e, 1))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::new(1, "Empty CSV file"));
    }

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| csv_error(&e, index + 2))?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let row: Map<String, Value> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let cell = record.get(i).unwrap_or("");
                (header.clone(), Value::String(cell.to_string()))
            })
            .collect();
        rows.push(row);
    }

    Ok(Table::from_rows(name, &headers, rows))
}

fn csv_error(error: &csv::Error, fallback_line: usize) -> CsvError {
    let line = error
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or(fallback_line);
    CsvError::new(line, error.to_string())
}

/// Parse CSV file with auto-detection of encoding and delimiter.
///
/// The table is named after the file stem.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| CsvError::new(0, format!("Cannot read file '{}': {}", path.display(), e)))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input");

    parse_bytes_auto(&bytes, name)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8], name: &str) -> CsvResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let table = parse_str(&content, delimiter, name)?;

    Ok(ParseResult {
        headers: table.definition.field_names(),
        table,
        encoding,
        delimiter,
    })
}
