//! File system watcher: debounced change detection driving incremental
//! rebuilds.
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌───────────────────────────┐
//! │ notify   │───▶│ Debouncer│───▶│ handle_changes()          │
//! │ events   │    │ (300ms)  │    │  config  -> full build    │
//! └──────────┘    └──────────┘    │  assets  -> copy assets   │
//!                                 │  sources -> incremental   │
//! └───────────────────────────────┴───────────────────────────┘
//! ```
//!
//! One build runs to completion before the next batch of changes is
//! processed; there is never a concurrent-build overlap. The incremental
//! planner re-detects changed files itself (mtime and record hashes), so
//! the watcher only has to decide the build mode.

use crate::{build::Site, config::SiteConfig, log};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

const DEBOUNCE_MS: u64 = 300;
const REBUILD_COOLDOWN_MS: u64 = 800;

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Batches rapid file events with debouncing and rebuild cooldown.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
            last_rebuild: None,
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_rebuild
            .is_some_and(|t| t.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS))
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn mark_rebuild(&mut self) {
        self.last_rebuild = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

/// Decide the rebuild mode for a batch of changed paths and run it.
fn handle_changes(site: &mut Site, paths: &[PathBuf]) {
    if paths.is_empty() {
        return;
    }

    // config_path is already resolved against the root at startup
    let config_path = site.config.config_path.clone();
    let assets_dir = site.config.assets_dir();

    let config_changed = paths.iter().any(|p| *p == config_path);
    let assets_changed = paths.iter().any(|p| p.starts_with(&assets_dir));
    let sources_changed = paths
        .iter()
        .any(|p| *p != config_path && !p.starts_with(&assets_dir));

    if config_changed {
        log!("watch"; "config changed, rebuilding...");
        match SiteConfig::from_path(&config_path) {
            Ok(mut config) => {
                config.root = site.config.root.clone();
                site.config = config;
            }
            Err(err) => log!("watch"; "config reload failed: {err}"),
        }
        if let Err(err) = site.build(false) {
            log!("watch"; "full build failed: {err:#}");
        }
        return;
    }

    if assets_changed {
        if let Err(err) = crate::build::copy_assets(&site.config) {
            log!("watch"; "asset copy failed: {err:#}");
        }
    }

    if sources_changed {
        let changed: Vec<String> = paths
            .iter()
            .filter(|p| p.starts_with(site.config.pages_dir()))
            .map(|p| {
                p.strip_prefix(site.config.pages_dir())
                    .unwrap_or(p)
                    .display()
                    .to_string()
            })
            .collect();
        if !changed.is_empty() {
            log!("watch"; "{} changed, rebuilding...", changed.join(", "));
        }
        if let Err(err) = site.build(true) {
            log!("watch"; "incremental build failed: {err:#}");
        }
    }
}

fn setup_watchers(watcher: &mut impl Watcher, config: &SiteConfig) -> Result<()> {
    let watched = [
        (config.pages_dir(), RecursiveMode::Recursive),
        (config.assets_dir(), RecursiveMode::Recursive),
        (config.config_path.clone(), RecursiveMode::NonRecursive),
    ];
    for (path, mode) in watched {
        if path.exists() {
            watcher
                .watch(&path, mode)
                .with_context(|| format!("Failed to watch {}", path.display()))?;
            log!("watch"; "watching {}", path.display());
        }
    }
    Ok(())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Start the blocking watch loop. Returns when the event channel closes
/// (watcher dropped on shutdown).
pub fn watch_for_changes_blocking(mut site: Site) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, &site.config)?;

    let mut debouncer = Debouncer::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) && !debouncer.in_cooldown() => {
                debouncer.add(event);
            }
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                handle_changes(&mut site, &debouncer.take());
                debouncer.mark_rebuild();
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            // Irrelevant events, timeouts without pending work
            _ => {}
        }
    }

    Ok(())
}
