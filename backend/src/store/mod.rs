//! Mapping store - save and reuse mapping sets
//!
//! Saved mapping sets live on disk as one JSON file each (the same wire shape
//! as an exported mapping set, wrapped with usage metadata). When a new file
//! comes in, its headers are matched against the source columns each saved
//! set was built for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::logs::{log_success, log_warning};
use crate::error::{StoreError, StoreResult};
use crate::transform::mapping::MappingSet;

/// Directory where mapping sets are stored (relative to current dir)
pub const DEFAULT_STORE_DIR: &str = ".fieldmap/mappings";

/// Minimum share of a saved set's columns a file must have to be compatible.
const COMPATIBILITY_THRESHOLD: f64 = 0.5;

/// A saved mapping set with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMapping {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub mapping: MappingSet,
    /// Source columns this set was created for
    pub source_columns: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    /// Success rate (0.0 to 1.0), exponential moving average
    pub success_rate: f64,
    /// Number of times used
    pub use_count: u32,
}

/// On-disk collection of saved mapping sets
#[derive(Debug)]
pub struct MappingStore {
    dir: PathBuf,
    mappings: BTreeMap<String, StoredMapping>,
}

impl MappingStore {
    /// Open a store, loading every saved set from `dir`.
    ///
    /// A missing directory is an empty store; unreadable files are skipped
    /// with a warning.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let mut store = Self {
            dir: dir.as_ref().to_path_buf(),
            mappings: BTreeMap::new(),
        };
        store.load_all();
        store
    }

    fn load_all(&mut self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let loaded = fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|content| serde_json::from_str::<StoredMapping>(&content).map_err(StoreError::from));
            match loaded {
                Ok(stored) => {
                    self.mappings.insert(stored.id.clone(), stored);
                }
                Err(e) => log_warning(format!("Skipping {}: {}", path.display(), e)),
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All saved sets, ordered by id
    pub fn list(&self) -> Vec<&StoredMapping> {
        self.mappings.values().collect()
    }

    pub fn get(&self, id: &str) -> StoreResult<&StoredMapping> {
        self.mappings.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Saved sets compatible with the given headers, best first.
    ///
    /// Ranked by compatibility score times success rate.
    pub fn find_compatible(&self, headers: &[String]) -> Vec<(&StoredMapping, f64)> {
        let mut compatible: Vec<_> = self
            .mappings
            .values()
            .filter_map(|m| {
                let score = compatibility(&m.source_columns, headers);
                (score > COMPATIBILITY_THRESHOLD).then_some((m, score))
            })
            .collect();

        compatible.sort_by(|a, b| {
            let rank_a = a.1 * a.0.success_rate;
            let rank_b = b.1 * b.0.success_rate;
            rank_b.total_cmp(&rank_a)
        });
        compatible
    }

    /// Save a mapping set; returns its new id.
    pub fn save(&mut self, mapping: MappingSet, name: &str, source_columns: Vec<String>) -> StoreResult<String> {
        fs::create_dir_all(&self.dir)?;

        let id = self.generate_id(name);
        let stored = StoredMapping {
            id: id.clone(),
            name: name.to_string(),
            mapping,
            source_columns,
            created_at: Utc::now(),
            last_used: None,
            success_rate: 1.0,
            use_count: 0,
        };

        self.write(&stored)?;
        self.mappings.insert(id.clone(), stored);
        log_success(format!("Saved mapping set \"{}\" as {}", name, id));
        Ok(id)
    }

    /// Import a mapping set from a JSON file.
    ///
    /// The source columns are taken from the set's own rules.
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> StoreResult<String> {
        let content = fs::read_to_string(path)?;
        let mapping = MappingSet::from_json(&content)?;

        let name = match name {
            Some(name) => name.to_string(),
            None if !mapping.name.is_empty() => mapping.name.clone(),
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
                .to_string(),
        };
        let columns = mapping.source_columns();
        self.save(mapping, &name, columns)
    }

    /// Update statistics after using a set
    pub fn record_use(&mut self, id: &str, success: bool) -> StoreResult<()> {
        let stored = self
            .mappings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        stored.success_rate = if success {
            stored.success_rate * 0.9 + 0.1
        } else {
            stored.success_rate * 0.9
        };
        stored.last_used = Some(Utc::now());
        stored.use_count += 1;

        let stored = stored.clone();
        self.write(&stored)
    }

    pub fn delete(&mut self, id: &str) -> StoreResult<()> {
        if self.mappings.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_for(id))?;
        Ok(())
    }

    fn write(&self, stored: &StoredMapping) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(stored)?;
        fs::write(self.path_for(&stored.id), content)?;
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Slug of the name plus a millisecond timestamp, unique within the store
    fn generate_id(&self, name: &str) -> String {
        let slug = slugify(name);
        let slug = if slug.is_empty() { "mapping".to_string() } else { slug };

        let mut timestamp = Utc::now().timestamp_millis();
        loop {
            let id = format!("{}-{}", slug, timestamp);
            if !self.mappings.contains_key(&id) {
                return id;
            }
            timestamp += 1;
        }
    }
}

impl Default for MappingStore {
    fn default() -> Self {
        Self::open(DEFAULT_STORE_DIR)
    }
}

/// Share of `stored` columns present in `headers` (case-insensitive)
pub fn compatibility(stored: &[String], headers: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }

    let headers: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let matched = stored
        .iter()
        .filter(|col| headers.contains(&col.to_lowercase()))
        .count();

    matched as f64 / stored.len() as f64
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
