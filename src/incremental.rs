//! Incremental build planning: fingerprint record and change-set closure.
//!
//! Between builds a small record persists at the project root:
//!
//! ```json
//! { "last_build": "2024-01-15T08:30:00.123456",
//!   "data_file_integrity": { "<slug>": "<blake3 hex>" } }
//! ```
//!
//! An incremental build diffs file mtimes against `last_build` and record
//! hashes against `data_file_integrity`, then expands the union through
//! the reverse-dependency index until a fixed point. A missing or
//! unparsable record means "no prior state" and is never an error.

use crate::{
    config::{ALLOWED_EXTENSIONS, SiteConfig},
    document::Metadata,
    graph::DepId,
    loader::RecordHash,
    log,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Persisted state from the previous build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    /// ISO-8601 timestamp of the last completed build
    pub last_build: String,
    /// Data-record slug -> content hash
    #[serde(default)]
    pub data_file_integrity: BTreeMap<String, String>,
}

impl Fingerprint {
    /// Load the record, treating a missing or unreadable file as no prior
    /// state.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                log!("warn"; "unreadable fingerprint {}: {err}, running a full build", path.display());
                None
            }
        }
    }

    /// Persist the record. Called only after a build completes fully.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string(self).context("serializing fingerprint")?;
        fs::write(path, raw)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Timestamp of the last build, if one is recorded and parsable.
    pub fn last_build_time(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.last_build, TIMESTAMP_FORMAT).ok()
    }
}

/// Content hash of one data record, stable across key order.
pub fn record_hash(record: &Metadata) -> String {
    let json = serde_json::to_string(record).unwrap_or_default();
    hex::encode(blake3::hash(json.as_bytes()).as_bytes())
}

/// Diff loaded record hashes against the stored map, updating it in place.
/// Returns the synthetic paths of changed records.
pub fn changed_records(
    hashes: &[RecordHash],
    integrity: &mut BTreeMap<String, String>,
) -> Vec<PathBuf> {
    let mut changed = Vec::new();
    for record in hashes {
        if integrity.get(&record.slug) != Some(&record.hash) {
            integrity.insert(record.slug.clone(), record.hash.clone());
            changed.push(record.path.clone());
        }
    }
    changed
}

/// Source files modified since the last build, as paths relative to the
/// pages root.
pub fn changed_source_files(config: &SiteConfig, last_build: NaiveDateTime) -> Vec<PathBuf> {
    let pages_root = config.pages_dir();
    let mut changed = Vec::new();

    for entry in WalkDir::new(&pages_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !ALLOWED_EXTENSIONS.contains(&ext) {
            continue;
        }

        let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
            continue;
        };
        if DateTime::<Local>::from(modified).naive_local() > last_build {
            let rel = entry
                .path()
                .strip_prefix(&pages_root)
                .unwrap_or(entry.path())
                .to_path_buf();
            log!("build"; "detected change in {}", rel.display());
            changed.push(rel);
        }
    }
    changed
}

/// Expand a change set to its full impact closure through the reverse
/// index: any document depending on a changed document is itself changed.
pub fn expand_closure(
    initial: Vec<PathBuf>,
    reverse: &FxHashMap<DepId, FxHashSet<PathBuf>>,
) -> FxHashSet<PathBuf> {
    let mut closure: FxHashSet<PathBuf> = FxHashSet::default();
    let mut worklist = initial;

    while let Some(path) = worklist.pop() {
        if !closure.insert(path.clone()) {
            continue;
        }
        if let Some(dependents) = reverse.get(&DepId::Doc(path)) {
            for dependent in dependents {
                if !closure.contains(dependent) {
                    worklist.push(dependent.clone());
                }
            }
        }
    }
    closure
}
