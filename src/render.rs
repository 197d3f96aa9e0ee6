//! Render driver: one document in, one output file out.
//!
//! Per document: take a page-local copy of site state, derive the final
//! URL, run pre-render hooks, render the body (markdown converted,
//! templates executed, data bodies empty), wrap in the layout chain, run
//! post-render hooks, and map the result to an on-disk permalink. A body
//! or template failure logs and skips the document; it never aborts the
//! build.

use crate::{
    config::SiteConfig,
    document::{Document, DocumentKind, Metadata},
    engine::{self, Engine},
    hooks::HookRegistry,
    layout, log,
    state::SiteState,
};
use chrono::Local;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// One generated output file.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Path relative to the output root
    pub output_path: PathBuf,
    pub html: String,
}

/// Render one document to its final output, or `None` when it produces no
/// page (skip flag, render failure).
pub fn render_document(
    engine: &mut Engine,
    config: &SiteConfig,
    hooks: &HookRegistry,
    documents: &FxHashMap<PathBuf, Document>,
    state: &mut SiteState,
    doc: &Document,
) -> Option<RenderedPage> {
    if doc.meta_flag("skip") {
        return None;
    }

    let rel = doc.source.to_string_lossy().replace('\\', "/");
    let is_home = rel == "templates/index.html";

    let mut page_meta = doc.metadata.clone();
    page_meta.insert(
        "generated_on".into(),
        Value::from(Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()),
    );
    page_meta.insert("generated_from".into(), Value::from(rel.clone()));
    page_meta.insert("template".into(), Value::from(rel.clone()));

    let url = if is_home {
        page_meta.insert("permalink".into(), Value::from(config.site.base_url.clone()));
        config.site.base_url.clone()
    } else if page_meta.get("date").is_some() {
        page_meta
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        // Non-dated pages get permalink-style URLs, not source paths
        let permalink = page_meta
            .get("permalink")
            .and_then(Value::as_str)
            .unwrap_or("/");
        format!("{}{permalink}", config.site.base_url)
    };
    page_meta.insert("url".into(), Value::from(url.clone()));

    let mut page_state = state.page_view();
    page_state.insert("url".into(), Value::from(url.clone()));
    if let Some(date) = page_meta.get("date").cloned() {
        page_state.insert("date".into(), date);
    }
    page_state.insert("page".into(), Value::Object(page_meta.clone()));
    page_state.insert("post".into(), Value::Object(page_meta.clone()));
    page_state.insert("site".into(), Value::Object(state.page_view()));

    let page_state = hooks.run_pre_render(&doc.source, page_state, state);

    let body = match doc.kind {
        DocumentKind::Markdown => page_meta
            .get("contents")
            .and_then(Value::as_str)
            .map_or_else(|| engine::markdown_to_html(&doc.body), str::to_string),
        DocumentKind::Template => match engine.render(&doc.body, &page_state) {
            Ok(html) => html,
            Err(err) => {
                log!("error"; "{}: {err:#}", doc.source.display());
                return None;
            }
        },
        DocumentKind::Data => String::new(),
    };

    let html = layout::resolve(
        engine,
        config,
        documents,
        state,
        &page_state,
        &doc.metadata,
        body,
        &doc.source,
    );
    let html = hooks.run_post_render(&doc.source, &page_state, state, html);

    let output_path = output_path_for(config, doc, &page_meta, &rel, is_home);
    let final_url = final_url_for(config, &output_path, is_home);

    let modified = source_mtime(config, doc);
    state.add_page_entry(
        &final_url,
        page_listing_entry(&page_meta, &final_url, &rel, modified),
    );
    state.record_permalink(&output_path.to_string_lossy(), &doc.source);

    Some(RenderedPage { output_path, html })
}

/// Map a document to its output path relative to the output root.
///
/// Precedence: home template, then dated posts, then user-assigned
/// permalinks, then explicit permalinks for templates-root pages, then the
/// source-relative path with `templates/` stripped and `.md` mapped to
/// `.html`.
fn output_path_for(
    config: &SiteConfig,
    doc: &Document,
    page_meta: &Metadata,
    rel: &str,
    is_home: bool,
) -> PathBuf {
    if is_home {
        return PathBuf::from("index.html");
    }

    let permalink_dir = |permalink: &str| {
        PathBuf::from(permalink.trim_matches('/')).join("index.html")
    };

    if page_meta.get("date").is_some() {
        if let Some(url) = page_meta.get("url").and_then(Value::as_str) {
            let tail = url
                .strip_prefix(config.site.base_url.as_str())
                .unwrap_or(url);
            return permalink_dir(tail);
        }
    }

    if doc.meta_flag("has_user_assigned_permalink") {
        if let Some(permalink) = page_meta.get("permalink").and_then(Value::as_str) {
            return permalink_dir(permalink);
        }
    }

    let stripped = rel.strip_prefix("templates/").unwrap_or(rel);
    if rel.starts_with("templates/") && (rel.ends_with(".html") || rel.ends_with(".md")) {
        if let Some(permalink) = page_meta.get("permalink").and_then(Value::as_str) {
            return permalink_dir(permalink);
        }
    }

    let mut out = stripped.to_string();
    if let Some(base) = out.strip_suffix(".md") {
        out = format!("{base}.html");
    }
    PathBuf::from(out)
}

/// Final public URL for an output path: directory-style for `index.html`
/// outputs, file URL otherwise.
fn final_url_for(config: &SiteConfig, output_path: &Path, is_home: bool) -> String {
    let base = &config.site.base_url;
    if is_home {
        return base.clone();
    }
    let rel = output_path.to_string_lossy().replace('\\', "/");
    match rel.strip_suffix("index.html") {
        Some(dir) => format!("{base}/{}/", dir.trim_matches('/')),
        None => format!("{base}/{rel}"),
    }
}

/// Modification time of a document's source file as seconds since the
/// epoch. Synthetic data records have no file and report zero.
fn source_mtime(config: &SiteConfig, doc: &Document) -> u64 {
    if doc.kind == DocumentKind::Data {
        return 0;
    }
    std::fs::metadata(config.pages_dir().join(&doc.source))
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs())
}

/// Build the `site.pages` listing entry for one rendered page.
fn page_listing_entry(page_meta: &Metadata, url: &str, rel: &str, modified: u64) -> Metadata {
    let mut entry = Metadata::new();
    entry.insert("url".into(), Value::from(url));
    entry.insert("file".into(), Value::from(rel));
    entry.insert("modified".into(), Value::from(modified));
    entry.insert(
        "title".into(),
        page_meta.get("title").cloned().unwrap_or_else(|| Value::from("")),
    );
    entry.insert(
        "collections".into(),
        page_meta
            .get("collections")
            .or_else(|| page_meta.get("collection"))
            .cloned()
            .unwrap_or_else(|| Value::from("")),
    );
    entry.insert(
        "noindex".into(),
        Value::Bool(page_meta.get("noindex").is_some()),
    );
    entry.insert(
        "private".into(),
        Value::Bool(page_meta.get("private").is_some()),
    );
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval;

    fn render_one(rel: &str, raw: &str) -> (Option<RenderedPage>, SiteState) {
        let mut config = SiteConfig::default();
        config.site.base_url = "https://example.com".into();
        let mut engine = Engine::new();
        let hooks = HookRegistry::new();
        let mut state = SiteState::new(&config);
        let mut doc = Document::from_source(PathBuf::from(rel), raw.to_string());
        eval::evaluate(&mut doc, &config, &mut state);
        let mut documents = FxHashMap::default();
        documents.insert(doc.source.clone(), doc.clone());
        let page = render_document(&mut engine, &config, &hooks, &documents, &mut state, &doc);
        (page, state)
    }

    #[test]
    fn test_markdown_post_renders_to_dated_path() {
        let (page, _) = render_one("posts/2024-01-15-hello.md", "---\ntitle: Hello\n---\n# Hi\n");
        let page = page.unwrap();
        assert_eq!(
            page.output_path,
            PathBuf::from("2024/01/15/hello/index.html")
        );
        assert!(page.html.contains("<h1>Hi</h1>"));
    }

    #[test]
    fn test_home_template_maps_to_root_index() {
        let (page, state) = render_one("templates/index.html", "<h1>home</h1>");
        let page = page.unwrap();
        assert_eq!(page.output_path, PathBuf::from("index.html"));
        let pages = state.values["pages"].as_array().unwrap();
        assert_eq!(pages[0]["url"], "https://example.com");
    }

    #[test]
    fn test_template_page_uses_permalink_dir() {
        let (page, state) = render_one("templates/about.html", "---\ntitle: About\n---\nabout us");
        let page = page.unwrap();
        assert_eq!(page.output_path, PathBuf::from("about/index.html"));
        let pages = state.values["pages"].as_array().unwrap();
        assert_eq!(pages[0]["url"], "https://example.com/about/");
        assert_eq!(pages[0]["title"], "About");
        // No file on disk behind this fixture document
        assert_eq!(pages[0]["modified"], 0);
    }

    #[test]
    fn test_nondated_page_url_is_permalink_form() {
        let (page, _) = render_one("templates/contact.html", "url is {{ page.url }}");
        assert!(
            page.unwrap()
                .html
                .contains("url is https://example.com/contact/")
        );
    }

    #[test]
    fn test_user_assigned_permalink_wins() {
        let (page, _) = render_one(
            "posts/notes.md",
            "---\npermalink: /elsewhere/deep\n---\nbody",
        );
        assert_eq!(
            page.unwrap().output_path,
            PathBuf::from("elsewhere/deep/index.html")
        );
    }

    #[test]
    fn test_skip_flag_suppresses_output() {
        let (page, _) = render_one("templates/hidden.html", "---\nskip: true\n---\nbody");
        assert!(page.is_none());
    }

    #[test]
    fn test_template_error_is_skipped_not_fatal() {
        let (page, _) = render_one("templates/broken.html", "{% for x in %}");
        assert!(page.is_none());
    }

    #[test]
    fn test_template_can_read_site_state() {
        let (page, _) = render_one(
            "templates/index2.html",
            "root: {{ site.root_url }}",
        );
        assert!(page.unwrap().html.contains("root: https://example.com"));
    }
}
