//! Document loading: source-tree walk plus data-record expansion.
//!
//! Two input roots feed the build:
//!
//! - the pages tree, walked recursively with an extension allow-list; every
//!   admitted file becomes one [`Document`] keyed by its path relative to
//!   the tree root
//! - the data directory, where each JSON array/object or CSV file expands
//!   into one synthetic Document per record
//!
//! A malformed record or unreadable file is logged and skipped; loading
//! never aborts over a single bad input.

use crate::{
    config::{ALLOWED_EXTENSIONS, SiteConfig},
    document::{Document, Metadata},
    log,
    state::SiteState,
};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::{fs, path::{Path, PathBuf}};
use walkdir::WalkDir;

/// Content hash bookkeeping for one data record, consumed by the
/// incremental planner.
#[derive(Debug, Clone)]
pub struct RecordHash {
    pub slug: String,
    pub hash: String,
    pub path: PathBuf,
}

/// Everything the loader produced for one build.
#[derive(Debug, Default)]
pub struct LoadedSite {
    /// All documents, keyed by path relative to the pages root (data
    /// records get synthetic `{stem}/{slug}/index.html` paths)
    pub documents: FxHashMap<PathBuf, Document>,
    /// Pages-tree walk order, then record order (stable)
    pub order: Vec<PathBuf>,
    /// Data file stem -> synthetic document paths it produced
    pub data_collections: FxHashMap<String, Vec<PathBuf>>,
    /// Per-record content hashes for fingerprint diffing
    pub record_hashes: Vec<RecordHash>,
}

impl LoadedSite {
    fn insert(&mut self, doc: Document) {
        if !self.documents.contains_key(&doc.source) {
            self.order.push(doc.source.clone());
        }
        self.documents.insert(doc.source.clone(), doc);
    }
}

/// Load every source file and data record for one build.
///
/// Data-file record arrays are also seeded into site state under the data
/// file's stem, so templates can iterate `site.{stem}` directly.
pub fn load_site(config: &SiteConfig, state: &mut SiteState) -> Result<LoadedSite> {
    let mut loaded = LoadedSite::default();
    load_pages(config, &mut loaded)?;
    load_data_files(config, state, &mut loaded);
    log!("load"; "loaded {} documents", loaded.documents.len());
    Ok(loaded)
}

/// Read a file as UTF-8, falling back to lossy decoding when the content
/// is not valid UTF-8.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            log!("load"; "{} is not valid UTF-8, decoding lossily", path.display());
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
    }
}

fn load_pages(config: &SiteConfig, loaded: &mut LoadedSite) -> Result<()> {
    let pages_root = config.pages_dir();
    if !pages_root.is_dir() {
        anyhow::bail!("Pages directory not found: {}", pages_root.display());
    }

    for entry in WalkDir::new(&pages_root)
        .sort_by_file_name()
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
        // Data files are loaded separately, record by record
        if entry.path().starts_with(config.data_dir()) {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(&pages_root)
            .unwrap_or(entry.path())
            .to_path_buf();

        match read_text(entry.path()) {
            Ok(raw) => loaded.insert(Document::from_source(rel, raw)),
            Err(err) => log!("error"; "{}: {:#}", rel.display(), err),
        }
    }

    Ok(())
}

fn load_data_files(config: &SiteConfig, state: &mut SiteState, loaded: &mut LoadedSite) {
    let data_root = config.data_dir();
    if !data_root.is_dir() {
        return;
    }

    for entry in WalkDir::new(&data_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let records = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => load_json_records(path),
            Some("csv") => load_csv_records(path),
            _ => {
                log!("warn"; "unsupported data file format: {}", path.display());
                continue;
            }
        };

        let Some(records) = records else { continue };
        expand_records(config, state, loaded, &stem, records);
    }
}

/// Parse a JSON data file into records. An array yields one record per
/// object element; a single top-level object is a one-record collection.
fn load_json_records(path: &Path) -> Option<Vec<Metadata>> {
    let raw = match read_text(path) {
        Ok(raw) => raw,
        Err(err) => {
            log!("error"; "{}: {:#}", path.display(), err);
            return None;
        }
    };
    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            log!("error"; "{}: invalid JSON: {err}", path.display());
            return None;
        }
    };

    match value {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    other => {
                        log!("warn"; "{}: skipping non-object record {other}", path.display());
                        None
                    }
                })
                .collect(),
        ),
        Value::Object(record) => Some(vec![record]),
        _ => {
            log!("warn"; "{}: expected an object or array of objects", path.display());
            None
        }
    }
}

/// Parse a CSV data file into one string-valued record per row.
fn load_csv_records(path: &Path) -> Option<Vec<Metadata>> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(err) => {
            log!("error"; "{}: {err}", path.display());
            return None;
        }
    };
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(err) => {
            log!("error"; "{}: {err}", path.display());
            return None;
        }
    };

    let mut records = Vec::new();
    for row in reader.records() {
        match row {
            Ok(row) => {
                let record: Metadata = headers
                    .iter()
                    .zip(row.iter())
                    .map(|(k, v)| (k.to_string(), Value::from(v)))
                    .collect();
                records.push(record);
            }
            Err(err) => log!("warn"; "{}: skipping row: {err}", path.display()),
        }
    }
    Some(records)
}

/// Turn each record into a synthetic document under `{stem}/{slug}/`.
fn expand_records(
    config: &SiteConfig,
    state: &mut SiteState,
    loaded: &mut LoadedSite,
    stem: &str,
    mut records: Vec<Metadata>,
) {
    let suppress_pages = config
        .disable_single_page_generation
        .iter()
        .any(|name| name == stem);

    let mut seeded = Vec::with_capacity(records.len());
    let mut paths = Vec::with_capacity(records.len());

    for (ordinal, record) in records.iter_mut().enumerate() {
        if record.get("slug").and_then(Value::as_str).is_none() {
            record.insert("slug".into(), Value::from(ordinal.to_string()));
        }
        if record.get("layout").and_then(Value::as_str).is_none() {
            record.insert("layout".into(), Value::from(stem));
        }
        if suppress_pages {
            record.insert("skip".into(), Value::Bool(true));
        }

        let slug = record["slug"].as_str().unwrap_or_default().to_string();
        let path = PathBuf::from(stem).join(&slug).join("index.html");

        let hash = crate::incremental::record_hash(record);
        loaded.record_hashes.push(RecordHash {
            slug,
            hash,
            path: path.clone(),
        });

        seeded.push(Value::Object(record.clone()));
        paths.push(path.clone());
        state.add_contributor(stem, &path);
        loaded.insert(Document::from_record(path, record.clone()));
    }

    loaded
        .data_collections
        .entry(stem.to_string())
        .or_default()
        .extend(paths);
    state.values.insert(stem.to_string(), Value::Array(seeded));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn site_with(files: &[(&str, &str)]) -> (TempDir, SiteConfig) {
        let dir = TempDir::new().unwrap();
        for (rel, content) in files {
            let path = dir.path().join("pages").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let mut config = SiteConfig::default();
        config.root = dir.path().to_path_buf();
        (dir, config)
    }

    #[test]
    fn test_load_pages_respects_allow_list() {
        let (_dir, config) = site_with(&[
            ("templates/index.html", "<h1>home</h1>"),
            ("posts/2024-01-01-a.md", "---\ntitle: A\n---\nbody"),
            ("notes.bin", "binary"),
        ]);
        let mut state = SiteState::new(&config);
        let loaded = load_site(&config, &mut state).unwrap();

        assert!(loaded.documents.contains_key(Path::new("templates/index.html")));
        assert!(loaded.documents.contains_key(Path::new("posts/2024-01-01-a.md")));
        assert!(!loaded.documents.contains_key(Path::new("notes.bin")));
    }

    #[test]
    fn test_json_array_expands_to_records() {
        let (_dir, config) = site_with(&[(
            "_data/pianos.json",
            r#"[{"slug": "jfk", "title": "JFK"}, {"title": "No slug"}]"#,
        )]);
        let mut state = SiteState::new(&config);
        let loaded = load_site(&config, &mut state).unwrap();

        let jfk = &loaded.documents[Path::new("pianos/jfk/index.html")];
        assert_eq!(jfk.meta_str("layout"), Some("pianos"));
        // Second record got an ordinal substitute slug
        assert!(loaded.documents.contains_key(Path::new("pianos/1/index.html")));
        assert_eq!(loaded.data_collections["pianos"].len(), 2);
        // Records seeded into site state under the file stem
        assert_eq!(state.values["pianos"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_json_object_is_single_record_collection() {
        let (_dir, config) = site_with(&[(
            "_data/about.json",
            r#"{"slug": "info", "title": "About"}"#,
        )]);
        let mut state = SiteState::new(&config);
        let loaded = load_site(&config, &mut state).unwrap();
        assert!(loaded.documents.contains_key(Path::new("about/info/index.html")));
    }

    #[test]
    fn test_csv_rows_become_records() {
        let (_dir, config) = site_with(&[(
            "_data/stations.csv",
            "slug,name\ncentral,Central Station\nnorth,North Station\n",
        )]);
        let mut state = SiteState::new(&config);
        let loaded = load_site(&config, &mut state).unwrap();

        let central = &loaded.documents[Path::new("stations/central/index.html")];
        assert_eq!(central.meta_str("name"), Some("Central Station"));
        assert_eq!(loaded.data_collections["stations"].len(), 2);
    }

    #[test]
    fn test_malformed_data_file_is_skipped() {
        let (_dir, config) = site_with(&[
            ("_data/bad.json", "not json at all"),
            ("templates/index.html", "ok"),
        ]);
        let mut state = SiteState::new(&config);
        let loaded = load_site(&config, &mut state).unwrap();
        // Bad data file skipped, rest of the load unaffected
        assert!(loaded.documents.contains_key(Path::new("templates/index.html")));
        assert!(loaded.data_collections.get("bad").is_none());
    }

    #[test]
    fn test_suppressed_collections_get_skip_flag() {
        let (_dir, mut config) = site_with(&[(
            "_data/pianos.json",
            r#"[{"slug": "jfk"}]"#,
        )]);
        config.disable_single_page_generation = vec!["pianos".into()];
        let mut state = SiteState::new(&config);
        let loaded = load_site(&config, &mut state).unwrap();
        assert!(loaded.documents[Path::new("pianos/jfk/index.html")].meta_flag("skip"));
    }
}
