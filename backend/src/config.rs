//! Engine configuration read from the environment.
//!
//! Values come from process environment variables, after loading a `.env`
//! file when one is present. Invalid numbers fall back to the default with a
//! warning; CLI flags override whatever is read here.
//!
//! | Variable | Default |
//! |---|---|
//! | `FIELDMAP_STORE_DIR` | `.fieldmap/mappings` |
//! | `FIELDMAP_PORT` | `3000` |
//! | `FIELDMAP_ROW_CONCURRENCY` | `16` (min 1) |
//! | `FIELDMAP_PREVIEW_ROWS` | `10` |

use std::path::PathBuf;
use std::str::FromStr;

use crate::api::logs::log_warning;
use crate::store::DEFAULT_STORE_DIR;
use crate::transform::output::DEFAULT_ROW_CONCURRENCY;

pub const STORE_DIR_VAR: &str = "FIELDMAP_STORE_DIR";
pub const PORT_VAR: &str = "FIELDMAP_PORT";
pub const ROW_CONCURRENCY_VAR: &str = "FIELDMAP_ROW_CONCURRENCY";
pub const PREVIEW_ROWS_VAR: &str = "FIELDMAP_PREVIEW_ROWS";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Where saved mapping sets live
    pub store_dir: PathBuf,
    /// HTTP port for `serve`
    pub port: u16,
    /// Rows resolved concurrently during output generation
    pub row_concurrency: usize,
    /// Rows returned by previews
    pub preview_rows: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            port: 3000,
            row_concurrency: DEFAULT_ROW_CONCURRENCY,
            preview_rows: 10,
        }
    }
}

impl EngineConfig {
    /// Load `.env` (if present), then read the environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            store_dir: lookup(STORE_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.store_dir),
            port: parse_or(PORT_VAR, lookup(PORT_VAR), defaults.port),
            row_concurrency: parse_or(ROW_CONCURRENCY_VAR, lookup(ROW_CONCURRENCY_VAR), defaults.row_concurrency)
                .max(1),
            preview_rows: parse_or(PREVIEW_ROWS_VAR, lookup(PREVIEW_ROWS_VAR), defaults.preview_rows),
        }
    }
}

fn parse_or<T: FromStr + std::fmt::Display>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            log_warning(format!("{}='{}' is not valid, using {}", name, raw, default));
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        EngineConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]), EngineConfig::default());
        assert_eq!(EngineConfig::default().store_dir, PathBuf::from(".fieldmap/mappings"));
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            (STORE_DIR_VAR, "/tmp/maps"),
            (PORT_VAR, "8080"),
            (ROW_CONCURRENCY_VAR, "4"),
            (PREVIEW_ROWS_VAR, " 25 "),
        ]);
        assert_eq!(cfg.store_dir, PathBuf::from("/tmp/maps"));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.row_concurrency, 4);
        assert_eq!(cfg.preview_rows, 25);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = config(&[(PORT_VAR, "http"), (ROW_CONCURRENCY_VAR, "0"), (PREVIEW_ROWS_VAR, "-3")]);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.row_concurrency, 1);
        assert_eq!(cfg.preview_rows, 10);
    }
}
