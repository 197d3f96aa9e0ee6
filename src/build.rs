//! Build orchestration.
//!
//! ```text
//! load ──▶ evaluate ──▶ annotate next/previous ──▶ analyze deps
//!                                                      │
//!   write ◀── archives ◀── render (topo order) ◀── [closure narrowing]
//! ```
//!
//! One `Site` owns the configuration, template engine and hook registry;
//! every call to [`Site::build`] runs a complete build with fresh state.
//! All documents are loaded, evaluated and dependency-analyzed before any
//! rendering begins, so every render sees final bucket contents.

use crate::{
    archives,
    config::SiteConfig,
    deps,
    document::{Document, Metadata},
    engine::Engine,
    eval,
    graph::BuildGraph,
    hooks::HookRegistry,
    incremental::{self, Fingerprint},
    loader, log,
    render::{self, RenderedPage},
    state::SiteState,
};
use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use walkdir::WalkDir;

/// One site project: configuration plus the long-lived engine and hooks.
pub struct Site {
    pub config: SiteConfig,
    engine: Engine,
    hooks: HookRegistry,
}

impl Site {
    pub fn new(config: SiteConfig) -> Self {
        Self::with_hooks(config, HookRegistry::new())
    }

    pub fn with_hooks(config: SiteConfig, mut hooks: HookRegistry) -> Self {
        let mut engine = Engine::new();
        hooks.install_filters(&mut engine);
        Self {
            config,
            engine,
            hooks,
        }
    }

    /// Run one full or incremental build to completion.
    pub fn build(&mut self, incremental_mode: bool) -> Result<()> {
        let start = Instant::now();
        let mut state = SiteState::new(&self.config);

        let fingerprint = if incremental_mode {
            Fingerprint::load(&self.config.fingerprint_path())
        } else {
            None
        };

        let mut loaded = loader::load_site(&self.config, &mut state)?;

        // Data-record changes are detected by content hash regardless of
        // build mode; the updated map is persisted at the end
        let mut integrity = fingerprint
            .as_ref()
            .map(|f| f.data_file_integrity.clone())
            .unwrap_or_default();
        let changed_data = incremental::changed_records(&loaded.record_hashes, &mut integrity);

        let mut order = loaded.order.clone();
        order.sort();
        for path in &order {
            if let Some(doc) = loaded.documents.get_mut(path) {
                eval::evaluate(doc, &self.config, &mut state);
            }
        }
        state.sort_posts();
        archives::publish_years_index(&mut state);
        annotate_navigation(&mut loaded.documents, &order);

        let known_paths: FxHashSet<PathBuf> = loaded.documents.keys().cloned().collect();
        let mut graph = BuildGraph::new();
        for path in &order {
            let doc = &loaded.documents[path];
            let edges = deps::analyze(doc, &self.config, &state, &known_paths);
            graph.insert(path.clone(), edges);
        }
        let reverse = graph.reverse_index();

        // Narrow the render set for incremental builds with prior state
        let closure = match &fingerprint {
            Some(record) => {
                let mut initial = changed_data;
                if let Some(last_build) = record.last_build_time() {
                    initial.extend(incremental::changed_source_files(&self.config, last_build));
                }
                let closure = incremental::expand_closure(initial, &reverse);
                if closure.is_empty() {
                    log!("build"; "no changes detected");
                    return Ok(());
                }
                Some(closure)
            }
            None => None,
        };

        let output_dir = self.config.output_dir();
        if !incremental_mode {
            clear_output_dir(&output_dir)?;
            copy_assets(&self.config)?;
        }
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let mut pages: Vec<RenderedPage> = Vec::new();
        for path in graph.flatten() {
            if !deps::is_renderable(&path) {
                continue;
            }
            if let Some(closure) = &closure {
                if !closure.contains(&path) {
                    continue;
                }
            }
            let doc = &loaded.documents[&path];
            if let Some(page) = render::render_document(
                &mut self.engine,
                &self.config,
                &self.hooks,
                &loaded.documents,
                &mut state,
                doc,
            ) {
                pages.push(page);
            }
        }

        if self.config.archives.dates {
            pages.extend(archives::generate_date_archives(
                &mut self.engine,
                &self.config,
                &loaded.documents,
                &state,
            ));
        }
        if self.config.archives.categories {
            pages.extend(archives::generate_term_archives(
                &mut self.engine,
                &self.config,
                &loaded.documents,
                &state,
                &self.config.archives.category_template,
                "categories",
                &self.config.archives.category_root,
            ));
        }
        if self.config.archives.tags {
            pages.extend(archives::generate_term_archives(
                &mut self.engine,
                &self.config,
                &loaded.documents,
                &state,
                &self.config.archives.tag_template,
                "tags",
                &self.config.archives.tag_root,
            ));
        }
        pages.extend(archives::generate_paginated_collections(
            &mut self.engine,
            &self.config,
            &loaded.documents,
            &state,
        ));

        for page in &pages {
            write_page(&output_dir, page)?;
        }

        state.warn_duplicate_permalinks();
        self.hooks.run_post_build(&state);

        let record = Fingerprint {
            last_build: state
                .values
                .get("build_timestamp")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            data_file_integrity: integrity,
        };
        record.save(&self.config.fingerprint_path())?;

        log!(
            "build";
            "built {} pages in {:.3}s",
            pages.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

/// Link each document to its neighbors in reverse-sorted path order, plus
/// the nearest neighbor sharing its categories.
fn annotate_navigation(documents: &mut FxHashMap<PathBuf, Document>, order: &[PathBuf]) {
    let mut sorted: Vec<PathBuf> = order.to_vec();
    sorted.sort();
    sorted.reverse();

    let nav_entry = |doc: &Document| -> Value {
        let mut entry = Metadata::new();
        entry.insert(
            "url".into(),
            doc.metadata.get("permalink").cloned().unwrap_or_else(|| Value::from("")),
        );
        entry.insert(
            "title".into(),
            doc.metadata.get("title").cloned().unwrap_or_else(|| Value::from("")),
        );
        Value::Object(entry)
    };
    let categories = |doc: &Document| -> Value {
        doc.metadata
            .get("categories")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    };

    for i in 0..sorted.len() {
        let own_categories = categories(&documents[&sorted[i]]);
        let mut updates: Vec<(String, Value)> = Vec::new();

        if i + 1 < sorted.len() {
            updates.push(("previous".into(), nav_entry(&documents[&sorted[i + 1]])));
            if let Some(neighbor) = sorted[i + 1..]
                .iter()
                .find(|p| categories(&documents[*p]) == own_categories)
            {
                updates.push((
                    "previous_in_same_category".into(),
                    nav_entry(&documents[neighbor]),
                ));
            }
        }
        if i > 0 {
            updates.push(("next".into(), nav_entry(&documents[&sorted[i - 1]])));
            if let Some(neighbor) = sorted[..i]
                .iter()
                .rev()
                .find(|p| categories(&documents[*p]) == own_categories)
            {
                updates.push((
                    "next_in_same_category".into(),
                    nav_entry(&documents[neighbor]),
                ));
            }
        }

        if let Some(doc) = documents.get_mut(&sorted[i]) {
            for (key, value) in updates {
                doc.metadata.insert(key, value);
            }
        }
    }
}

/// Write one rendered page under the output root.
fn write_page(output_dir: &Path, page: &RenderedPage) -> Result<()> {
    let path = output_dir.join(&page.output_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, &page.html)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Remove all previous output before a full build.
fn clear_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.is_dir() {
        fs::remove_dir_all(output_dir)
            .with_context(|| format!("Failed to clear {}", output_dir.display()))?;
    }
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    Ok(())
}

/// Copy the static asset tree verbatim to `{output}/assets`.
pub fn copy_assets(config: &SiteConfig) -> Result<()> {
    let assets_dir = config.assets_dir();
    if !assets_dir.is_dir() {
        return Ok(());
    }
    let target_root = config.output_dir().join("assets");

    for entry in WalkDir::new(&assets_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let rel = entry
            .path()
            .strip_prefix(&assets_dir)
            .unwrap_or(entry.path());
        let target = target_root.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::copy(entry.path(), &target)
            .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
    }
    Ok(())
}
