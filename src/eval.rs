//! Metadata evaluation: computed fields derived from a document's path and
//! front matter.
//!
//! Runs once per document per build, after loading and before dependency
//! analysis. Field order matters; later steps read earlier results:
//!
//! 1. slug (file stem, `posts/` prefix stripped)
//! 2. cached markdown HTML (`contents`)
//! 3. default URL
//! 4. permalink normalization (+ `has_user_assigned_permalink`)
//! 5. categories default
//! 6. slug-date extraction (`date`, `date_without_year`, `full_date`,
//!    dated URL rewrite, auto description)
//! 7. layout-bucket and collection registration (permalink-deduplicated)
//!
//! Evaluation is idempotent: re-running it for a changed document during an
//! incremental build replaces its bucket entries instead of duplicating
//! them.

use crate::{
    config::SiteConfig,
    document::{Document, DocumentKind, Metadata},
    engine, filters,
    state::SiteState,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("date regex"));

static DATE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}-").expect("date prefix regex"));

/// Compute a document's derived metadata and register it into site state.
pub fn evaluate(doc: &mut Document, config: &SiteConfig, state: &mut SiteState) {
    let rel = doc.source.to_string_lossy().replace('\\', "/");

    let slug = match doc.meta_str("slug") {
        Some(slug) => slug.to_string(),
        None => {
            let slug = file_slug(&rel);
            doc.metadata.insert("slug".into(), Value::from(slug.clone()));
            slug
        }
    };

    if doc.kind == DocumentKind::Markdown {
        doc.metadata.insert(
            "contents".into(),
            Value::from(engine::markdown_to_html(&doc.body)),
        );
    }

    let base = &config.site.base_url;
    let default_url = format!("{base}/{}", rel.strip_prefix("posts/").unwrap_or(&rel));
    doc.metadata.insert("url".into(), Value::from(default_url));

    // Any front-matter permalink is honored; only root-relative ones are
    // flagged as user-assigned
    let raw_permalink = doc.meta_str("permalink").map(str::to_string);
    if raw_permalink.as_deref().is_some_and(|p| p.starts_with('/')) {
        doc.metadata
            .insert("has_user_assigned_permalink".into(), Value::Bool(true));
    }
    let permalink = normalize_permalink(raw_permalink.as_deref().unwrap_or(&slug));
    doc.metadata
        .insert("permalink".into(), Value::from(permalink.clone()));

    if !doc.metadata.contains_key("categories") {
        doc.metadata.insert("categories".into(), Value::Array(Vec::new()));
    }

    if slug.starts_with(|c: char| c.is_ascii_digit()) {
        apply_slug_date(doc, config, &slug);
    }

    if let Some(layout) = doc.meta_str("layout").map(str::to_string) {
        state.register_layout_member(&layout, &permalink, doc.metadata.clone(), &doc.source);
    }
    if let Some(collection) = doc.meta_str("collection").map(str::to_string) {
        state.register_collection_member(&collection, &permalink, doc.metadata.clone(), &doc.source);
    }
    if rel.starts_with("posts/") {
        state.register_post(&permalink, doc.metadata.clone(), &doc.source);
    }
}

/// Slug for a source path: file name stem, with any `posts/` segment
/// stripped.
fn file_slug(rel: &str) -> String {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    let stem = name
        .rsplit_once('.')
        .map_or(name, |(stem, _)| stem);
    stem.replace("posts/", "")
}

/// `/about/` form: stripped of surrounding slashes, wrapped back in them.
pub fn normalize_permalink(permalink: &str) -> String {
    format!("/{}/", permalink.trim_matches('/'))
}

/// Extract a `YYYY-MM-DD` date from the slug and derive the dated fields.
fn apply_slug_date(doc: &mut Document, config: &SiteConfig, slug: &str) {
    let Some(found) = DATE_RE.find(slug) else {
        return;
    };
    let date_slug = found.as_str().to_string();

    // An hms front-matter field refines the slug date with a time of day
    let date = match doc.meta_str("hms").filter(|h| h.matches(':').count() == 2) {
        Some(hms) => format!("{date_slug} {hms}"),
        None => date_slug.clone(),
    };
    doc.metadata.insert("date".into(), Value::from(date.clone()));
    doc.metadata.insert(
        "date_without_year".into(),
        Value::from(date_slug[5..].to_string()),
    );
    if let Some(parsed) = filters::parse_date(&date) {
        doc.metadata.insert(
            "full_date".into(),
            Value::from(parsed.format("%B %d, %Y").to_string()),
        );
    }

    let slug_without_date = DATE_PREFIX_RE.replace(slug, "").into_owned();
    let date_path = date_slug.replace('-', "/");
    doc.metadata.insert(
        "url".into(),
        Value::from(format!(
            "{}/{date_path}/{slug_without_date}/",
            config.site.base_url
        )),
    );

    if !doc.metadata.contains_key("description") {
        let first_line = doc.body.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        doc.metadata.insert(
            "description".into(),
            Value::from(engine::markdown_to_html(first_line).trim().to_string()),
        );
    }
}
