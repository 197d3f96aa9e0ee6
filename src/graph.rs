//! Build graph: document dependency edges, render ordering, reverse index.
//!
//! ```text
//! ┌───────────────┐  insert(doc, deps)  ┌──────────────────────────┐
//! │ deps analyzer │────────────────────▶│ BuildGraph               │
//! └───────────────┘                     │  edges: doc -> {DepId}   │
//!                                       │  order: insertion order  │
//!                                       └───────┬──────────┬───────┘
//!                                       flatten │          │ reverse_index
//!                                               ▼          ▼
//!                                        render order   incremental
//!                                        (tolerant      closure
//!                                         Kahn)         expansion
//! ```
//!
//! Edge sets are replaced wholesale on every insert, never patched, so the
//! graph always reflects the current template text. Flattening tolerates
//! cycles: the strongly-connected remainder is emitted in insertion order
//! with a logged warning instead of hanging or panicking.

use crate::log;
use rustc_hash::{FxHashMap, FxHashSet};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

/// A dependency target: either another document or a named site-state
/// bucket (posts, a collection, a data file).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepId {
    Doc(PathBuf),
    State(String),
}

/// Directed dependency edges over all documents in one build.
#[derive(Debug, Default)]
pub struct BuildGraph {
    edges: FxHashMap<PathBuf, FxHashSet<DepId>>,
    order: Vec<PathBuf>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document's full dependency set, replacing any previous set.
    pub fn insert(&mut self, doc: PathBuf, deps: Vec<DepId>) {
        if !self.edges.contains_key(&doc) {
            self.order.push(doc.clone());
        }
        self.edges.insert(doc, deps.into_iter().collect());
    }

    pub fn contains(&self, doc: &Path) -> bool {
        self.edges.contains_key(doc)
    }

    pub fn dependencies(&self, doc: &Path) -> Option<&FxHashSet<DepId>> {
        self.edges.get(doc)
    }

    /// Topological render order: every document after its dependencies.
    ///
    /// Kahn's algorithm over document-to-document edges, with ties broken
    /// by insertion order so the result is stable run to run. A cyclic
    /// remainder is appended in insertion order and logged, never an error.
    pub fn flatten(&self) -> Vec<PathBuf> {
        let index: FxHashMap<&Path, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_path(), i))
            .collect();

        // dependency index -> dependent indices
        let mut dependents: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        let mut in_degree = vec![0usize; self.order.len()];

        for (doc, deps) in &self.edges {
            let doc_idx = index[doc.as_path()];
            for dep in deps {
                let DepId::Doc(dep_path) = dep else {
                    continue;
                };
                // Self-references and edges to non-document targets do not
                // constrain ordering
                match index.get(dep_path.as_path()) {
                    Some(&dep_idx) if dep_idx != doc_idx => {
                        dependents.entry(dep_idx).or_default().push(doc_idx);
                        in_degree[doc_idx] += 1;
                    }
                    _ => {}
                }
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut flattened = Vec::with_capacity(self.order.len());
        let mut emitted = vec![false; self.order.len()];

        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            emitted[next] = true;
            flattened.push(self.order[next].clone());

            if let Some(deps) = dependents.get(&next) {
                for &dependent in deps {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 && !emitted[dependent] {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if flattened.len() < self.order.len() {
            let remainder: Vec<_> = self
                .order
                .iter()
                .enumerate()
                .filter(|(i, _)| !emitted[*i])
                .map(|(_, p)| p.clone())
                .collect();
            log!(
                "deps";
                "dependency cycle among {} documents, falling back to load order for them",
                remainder.len()
            );
            flattened.extend(remainder);
        }

        flattened
    }

    /// Dependency target -> documents depending on it. Built once after
    /// analysis, consumed by the incremental planner.
    pub fn reverse_index(&self) -> FxHashMap<DepId, FxHashSet<PathBuf>> {
        let mut reverse: FxHashMap<DepId, FxHashSet<PathBuf>> = FxHashMap::default();
        for (doc, deps) in &self.edges {
            for dep in deps {
                reverse.entry(dep.clone()).or_default().insert(doc.clone());
            }
        }
        reverse
    }
}
