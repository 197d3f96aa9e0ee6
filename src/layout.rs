//! Layout resolution: bounded recursive template composition.
//!
//! A document naming a layout has its rendered body wrapped by that
//! layout's template; the layout's own front matter may name a further
//! layout, so resolution recurses until no `layout` key remains. The chain
//! is hard-capped: past [`INHERITANCE_LIMIT`] levels the branch is
//! abandoned with empty content and a critical log line, never a crash.
//!
//! Front-matter values containing template syntax are interpolated with
//! `page`/`site` context exactly once per key; a key set threaded through
//! the recursion prevents re-interpolation when the same key reappears in
//! a nested level.

use crate::{
    config::SiteConfig,
    document::{Document, Metadata},
    engine::Engine,
    log,
    state::SiteState,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A single template may not have more than this many levels of inheritance.
pub const INHERITANCE_LIMIT: usize = 10;

/// Wrap rendered content in its layout chain.
///
/// `metadata` is the front matter driving the first level (the page's own,
/// or a synthetic archive page's). Returns the final HTML.
pub fn resolve(
    engine: &mut Engine,
    config: &SiteConfig,
    documents: &FxHashMap<PathBuf, Document>,
    state: &SiteState,
    page_state: &Metadata,
    metadata: &Metadata,
    rendered: String,
    source: &Path,
) -> String {
    let mut interpolated = FxHashSet::default();
    resolve_level(
        engine,
        config,
        documents,
        state,
        page_state,
        metadata.clone(),
        rendered,
        source,
        0,
        &mut interpolated,
    )
}

#[allow(clippy::too_many_arguments)]
fn resolve_level(
    engine: &mut Engine,
    config: &SiteConfig,
    documents: &FxHashMap<PathBuf, Document>,
    state: &SiteState,
    page_state: &Metadata,
    mut metadata: Metadata,
    rendered: String,
    source: &Path,
    depth: usize,
    interpolated: &mut FxHashSet<String>,
) -> String {
    let Some(layout) = metadata.get("layout").and_then(Value::as_str).map(str::to_string)
    else {
        return rendered;
    };

    if depth > INHERITANCE_LIMIT {
        log!(
            "critical";
            "{} has more than {INHERITANCE_LIMIT} levels of layout recursion, emitting empty content",
            source.display()
        );
        return String::new();
    }

    let layout_path = config.layout_rel_path(&layout);
    let Some(layout_doc) = documents.get(&layout_path) else {
        log!("warn"; "{}: layout {} not found", source.display(), layout_path.display());
        return rendered;
    };

    interpolate_front_matter(engine, &mut metadata, state, interpolated);

    let mut context = page_state.clone();
    context.insert("content".into(), Value::from(rendered.clone()));
    context.insert("page".into(), Value::Object(metadata.clone()));
    context.insert("post".into(), Value::Object(metadata.clone()));
    context.insert("site".into(), Value::Object(state.page_view()));

    let wrapped = match engine.render(&layout_doc.body, &context) {
        Ok(html) => html,
        Err(err) => {
            log!("error"; "{}: layout {layout}: {err:#}", source.display());
            return rendered;
        }
    };

    // The layout's own front matter drives the next level; the current
    // page's metadata rides along as page/post
    let mut next = layout_doc.metadata.clone();
    next.insert("page".into(), Value::Object(metadata.clone()));
    next.insert("post".into(), Value::Object(metadata));

    resolve_level(
        engine,
        config,
        documents,
        state,
        page_state,
        next,
        wrapped.trim().to_string(),
        source,
        depth + 1,
        interpolated,
    )
}

/// Evaluate front-matter values containing template syntax, once per key.
///
/// The `contents` key is exempt (it holds rendered page HTML), as is any
/// key already interpolated at an earlier recursion level. A value that
/// fails to evaluate is left as-is and logged.
pub fn interpolate_front_matter(
    engine: &mut Engine,
    metadata: &mut Metadata,
    state: &SiteState,
    interpolated: &mut FxHashSet<String>,
) {
    let keys: Vec<String> = metadata
        .iter()
        .filter(|(key, value)| {
            key.as_str() != "contents"
                && !interpolated.contains(key.as_str())
                && value.as_str().is_some_and(|s| s.contains('{'))
        })
        .map(|(key, _)| key.clone())
        .collect();

    for key in keys {
        let Some(template) = metadata.get(&key).and_then(Value::as_str).map(str::to_string)
        else {
            continue;
        };

        let mut context = Metadata::new();
        let page = metadata
            .get("page")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(|| metadata.clone());
        context.insert("page".into(), Value::Object(page));
        context.insert("site".into(), Value::Object(state.page_view()));

        match engine.render(&template, &context) {
            Ok(value) => {
                metadata.insert(key.clone(), Value::from(value));
                interpolated.insert(key);
            }
            Err(err) => {
                log!("warn"; "front matter value for {key} failed to evaluate: {err:#}");
            }
        }
    }
}
