//! Templating and markdown service boundary.
//!
//! The build pipeline treats template execution and markdown conversion as
//! opaque services; everything engine-specific lives behind this module:
//!
//! - [`Engine::render`]: execute a template body with page/site context
//! - [`markdown_to_html`]: markdown to HTML conversion
//! - [`find_included_templates`]: static include/extends extraction
//! - [`find_variable_references`]: static `site.*` read extraction
//!
//! Tera keeps its parse tree private, so the static scans pattern-match
//! the template text instead of walking an AST. The dependency analyzer
//! only needs the identifier lists, not node positions.

use crate::document::Metadata;
use anyhow::{Context as _, Result};
use pulldown_cmark::{Options, Parser, html::push_html};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tera::{Context, Tera};

/// `{% include "x.html" %}`, `{% extends "base.html" %}`, `{% import ... %}`
static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{%-?\s*(?:include|extends|import)\s+["']([^"']+)["']"#).expect("include regex")
});

/// Dotted attribute chains rooted at the site binding: `site.posts`,
/// `site.categories.writing`, ...
static SITE_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bsite((?:\.[A-Za-z_][A-Za-z0-9_]*)+)").expect("site variable regex")
});

/// Template execution engine with registered filters.
pub struct Engine {
    tera: Tera,
}

impl Engine {
    /// Create an engine with the built-in date filters registered.
    pub fn new() -> Self {
        let mut tera = Tera::default();
        crate::filters::register(&mut tera);
        Self { tera }
    }

    /// Register a custom template filter by name.
    pub fn register_filter<F>(&mut self, name: &str, filter: F)
    where
        F: tera::Filter + 'static,
    {
        self.tera.register_filter(name, filter);
    }

    /// Register an already-boxed filter (hook registry entries).
    pub fn register_boxed_filter(&mut self, name: &str, filter: Box<dyn tera::Filter>) {
        struct Boxed(Box<dyn tera::Filter>);
        impl tera::Filter for Boxed {
            fn filter(
                &self,
                value: &Value,
                args: &std::collections::HashMap<String, Value>,
            ) -> tera::Result<Value> {
                self.0.filter(value, args)
            }
        }
        self.tera.register_filter(name, Boxed(filter));
    }

    /// Render a template body with the given context values.
    pub fn render(&mut self, body: &str, context: &Metadata) -> Result<String> {
        let ctx = Context::from_serialize(Value::Object(context.clone()))
            .context("building template context")?;
        self.tera
            .render_str(body, &ctx)
            .map_err(|e| anyhow::anyhow!("template error: {}", tera_error_chain(&e)))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten a tera error and its sources into one line.
fn tera_error_chain(err: &tera::Error) -> String {
    use std::error::Error as _;
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Template files statically referenced by include/extends/import
/// directives, in order of first appearance.
pub fn find_included_templates(body: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for capture in INCLUDE_RE.captures_iter(body) {
        let name = capture[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Dotted variable chains rooted at `site.`, in order of first appearance.
///
/// Only strictly `site.`-prefixed reads count as global-state dependencies;
/// bare names are page-local.
pub fn find_variable_references(body: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for capture in SITE_VAR_RE.captures_iter(body) {
        let chain = format!("site{}", &capture[1]);
        if !seen.contains(&chain) {
            seen.push(chain);
        }
    }
    seen
}

/// Convert markdown to HTML with footnotes, tables, smart punctuation and
/// heading attributes enabled.
pub fn markdown_to_html(text: &str) -> String {
    let options = Options::ENABLE_FOOTNOTES
        | Options::ENABLE_TABLES
        | Options::ENABLE_SMART_PUNCTUATION
        | Options::ENABLE_HEADING_ATTRIBUTES;
    let parser = Parser::new_ext(text, options);
    let mut html = String::with_capacity(text.len() * 3 / 2);
    push_html(&mut html, parser);
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_with_site_context() {
        let mut engine = Engine::new();
        let ctx = context(&[("site", json!({"root_url": "https://example.com"}))]);
        let out = engine.render("url: {{ site.root_url }}", &ctx).unwrap();
        assert_eq!(out, "url: https://example.com");
    }

    #[test]
    fn test_render_loop_over_bucket() {
        let mut engine = Engine::new();
        let ctx = context(&[(
            "site",
            json!({"posts": [{"title": "A"}, {"title": "B"}]}),
        )]);
        let out = engine
            .render("{% for p in site.posts %}{{ p.title }};{% endfor %}", &ctx)
            .unwrap();
        assert_eq!(out, "A;B;");
    }

    #[test]
    fn test_render_error_reported() {
        let mut engine = Engine::new();
        let err = engine
            .render("{% for x in %}", &Metadata::new())
            .unwrap_err();
        assert!(err.to_string().contains("template error"));
    }

    #[test]
    fn test_find_included_templates() {
        let body = r#"
            {% include "_layouts/nav.html" %}
            {% extends "base.html" %}
            {% include "_layouts/nav.html" %}
        "#;
        assert_eq!(
            find_included_templates(body),
            vec!["_layouts/nav.html", "base.html"]
        );
    }

    #[test]
    fn test_find_variable_references_strict_prefix() {
        let body = "{{ site.posts }} {{ posts }} {% for c in site.categories.writing %}{% endfor %}";
        assert_eq!(
            find_variable_references(body),
            vec!["site.posts", "site.categories.writing"]
        );
    }

    #[test]
    fn test_find_variable_references_dedup() {
        let body = "{{ site.posts }}{{ site.posts }}";
        assert_eq!(find_variable_references(body), vec!["site.posts"]);
    }

    #[test]
    fn test_markdown_to_html_basic() {
        let html = markdown_to_html("# Title\n\nHello *world*");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>world</em>"));
    }

    #[test]
    fn test_markdown_footnotes_enabled() {
        let html = markdown_to_html("text[^1]\n\n[^1]: note");
        assert!(html.contains("footnote"));
    }
}
