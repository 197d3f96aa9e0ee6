//! Dependency analysis: what a document's template body reads.
//!
//! Two edge kinds come out of a single static scan:
//!
//! - include edges: templates named by include/extends/import directives,
//!   resolved as paths under the source root
//! - state-read edges: `site.`-prefixed variable chains whose first segment
//!   names a populated state bucket; these expand to an edge per document
//!   contributing to that bucket, because any contributor change can change
//!   the reader's output
//!
//! The document's own layout file is always an edge. Sets are recomputed
//! from scratch on every call; nothing is patched incrementally.

use crate::{
    config::SiteConfig,
    document::Document,
    engine,
    graph::DepId,
    state::SiteState,
};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

/// Compute the full dependency set for one document.
pub fn analyze(
    doc: &Document,
    config: &SiteConfig,
    state: &SiteState,
    known_paths: &FxHashSet<PathBuf>,
) -> Vec<DepId> {
    let mut deps: Vec<DepId> = Vec::new();
    let mut seen: FxHashSet<DepId> = FxHashSet::default();
    let mut push = |deps: &mut Vec<DepId>, dep: DepId| {
        if seen.insert(dep.clone()) {
            deps.push(dep);
        }
    };

    for include in engine::find_included_templates(&doc.body) {
        push(&mut deps, DepId::Doc(PathBuf::from(include)));
    }

    for chain in engine::find_variable_references(&doc.body) {
        // "site.posts.title" -> bucket key "posts"
        let key = chain
            .strip_prefix("site.")
            .and_then(|rest| rest.split('.').next())
            .unwrap_or_default();
        if key.is_empty() {
            continue;
        }

        if state.contains(key) {
            push(&mut deps, DepId::State(key.to_string()));
            if let Some(contributors) = state.contributors(key) {
                for contributor in contributors {
                    if contributor != &doc.source {
                        push(&mut deps, DepId::Doc(contributor.clone()));
                    }
                }
            }
        }

        // A read of e.g. site.posts also depends on the post layout file
        // when one exists
        let layout_path = layout_candidate(config, key);
        if known_paths.contains(&layout_path) {
            push(&mut deps, DepId::Doc(layout_path));
        }
    }

    if let Some(layout) = doc.meta_str("layout") {
        let layout_path = config.layout_rel_path(layout);
        if layout_path != doc.source {
            push(&mut deps, DepId::Doc(layout_path));
        }
    }

    deps
}

/// Layout file a bucket name would correspond to: `posts` -> `post.html`.
fn layout_candidate(config: &SiteConfig, key: &str) -> PathBuf {
    let singular = key.strip_suffix('s').unwrap_or(key);
    config.layout_rel_path(singular)
}

/// Whether a document is renderable output rather than an underscore-prefixed
/// internal file (layouts, data templates).
pub fn is_renderable(path: &Path) -> bool {
    !path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('_'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    fn setup() -> (SiteConfig, SiteState, FxHashSet<PathBuf>) {
        let config = SiteConfig::default();
        let state = SiteState::new(&config);
        (config, state, FxHashSet::default())
    }

    fn doc(rel: &str, raw: &str) -> Document {
        Document::from_source(PathBuf::from(rel), raw.to_string())
    }

    #[test]
    fn test_include_edges() {
        let (config, state, known) = setup();
        let d = doc(
            "templates/index.html",
            r#"{% include "_layouts/nav.html" %}"#,
        );
        let deps = analyze(&d, &config, &state, &known);
        assert!(deps.contains(&DepId::Doc(PathBuf::from("_layouts/nav.html"))));
    }

    #[test]
    fn test_state_read_expands_to_contributors() {
        let (config, mut state, known) = setup();
        state.register_post("/a/", Metadata::new(), Path::new("posts/2024-01-01-a.md"));
        state.register_post("/b/", Metadata::new(), Path::new("posts/2024-01-02-b.md"));

        let d = doc(
            "templates/index.html",
            "{% for p in site.posts %}{{ p.title }}{% endfor %}",
        );
        let deps = analyze(&d, &config, &state, &known);

        assert!(deps.contains(&DepId::State("posts".into())));
        assert!(deps.contains(&DepId::Doc(PathBuf::from("posts/2024-01-01-a.md"))));
        assert!(deps.contains(&DepId::Doc(PathBuf::from("posts/2024-01-02-b.md"))));
    }

    #[test]
    fn test_unprefixed_variables_are_not_dependencies() {
        let (config, mut state, known) = setup();
        state.register_post("/a/", Metadata::new(), Path::new("posts/2024-01-01-a.md"));

        let d = doc("templates/index.html", "{{ posts }}");
        let deps = analyze(&d, &config, &state, &known);
        assert!(deps.is_empty());
    }

    #[test]
    fn test_bucket_read_adds_layout_file_when_present() {
        let (config, mut state, mut known) = setup();
        state.register_post("/a/", Metadata::new(), Path::new("posts/2024-01-01-a.md"));
        known.insert(PathBuf::from("_layouts/post.html"));

        let d = doc("templates/index.html", "{{ site.posts }}");
        let deps = analyze(&d, &config, &state, &known);
        assert!(deps.contains(&DepId::Doc(PathBuf::from("_layouts/post.html"))));
    }

    #[test]
    fn test_own_layout_is_a_dependency() {
        let (config, state, known) = setup();
        let d = doc(
            "posts/2024-01-01-a.md",
            "---\nlayout: post\n---\nbody",
        );
        let deps = analyze(&d, &config, &state, &known);
        assert!(deps.contains(&DepId::Doc(PathBuf::from("_layouts/post.html"))));
    }

    #[test]
    fn test_no_self_edge_from_own_bucket() {
        let (config, mut state, known) = setup();
        let source = Path::new("posts/2024-01-01-a.md");
        state.register_post("/a/", Metadata::new(), source);

        let d = doc("posts/2024-01-01-a.md", "{{ site.posts }}");
        let deps = analyze(&d, &config, &state, &known);
        assert!(!deps.contains(&DepId::Doc(source.to_path_buf())));
    }

    #[test]
    fn test_is_renderable() {
        assert!(is_renderable(Path::new("templates/index.html")));
        assert!(is_renderable(Path::new("posts/2024-01-01-a.md")));
        assert!(!is_renderable(Path::new("_layouts/post.html")));
        assert!(!is_renderable(Path::new("_data/pianos.json")));
    }
}
