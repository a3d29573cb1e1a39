//! Compiled regular expressions cached next to the pattern they came from.
//!
//! Stages keep their pattern in a public field that callers may edit. The
//! cache therefore remembers which pattern it compiled and recompiles when the
//! field no longer matches it.

use regex::Regex;
use std::sync::Mutex;

type Compiled = Result<Regex, String>;

#[derive(Debug, Default)]
pub struct CompiledPattern {
    cached: Mutex<Option<(String, Compiled)>>,
}

impl CompiledPattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// The regex for `pattern`, or the compile error message.
    pub fn get(&self, pattern: &str) -> Compiled {
        let mut cached = self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match cached.as_ref() {
            Some((source, compiled)) if source == pattern => compiled.clone(),
            _ => {
                let compiled = Regex::new(pattern).map_err(|e| e.to_string());
                *cached = Some((pattern.to_string(), compiled.clone()));
                compiled
            }
        }
    }
}

impl Clone for CompiledPattern {
    fn clone(&self) -> Self {
        let cached = self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            cached: Mutex::new(cached.clone()),
        }
    }
}
