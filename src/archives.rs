//! Archive and pagination page generation.
//!
//! Runs after every source document has been evaluated, so the post
//! buckets these pages list are complete:
//!
//! - date archives: `/{year}/`, `/{year}/{month}/`, `/{year}/{month}/{day}/`
//!   for every date combination present among dated posts
//! - term archives: one page per distinct category/tag value at
//!   `{root}/{slugified-term}/index.html`
//! - paginated collections: fixed-size slices of a collection, page 1 at
//!   `{template}/index.html`, page N at `{template}/{N}/index.html`
//!
//! All of them render through the same layout resolver as normal pages,
//! with the same interpolation and recursion-limit rules.

use crate::{
    config::SiteConfig,
    document::{Document, Metadata},
    engine::Engine,
    layout, log,
    render::RenderedPage,
    state::SiteState,
};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Lowercased, whitespace-trimmed, ASCII-transliterated slug.
pub fn slugify(value: &str) -> String {
    deunicode::deunicode(value)
        .to_lowercase()
        .trim()
        .replace(' ', "-")
}

/// Nested year -> month -> day -> posts index over the dated posts.
type YearsIndex = BTreeMap<i32, BTreeMap<u32, BTreeMap<u32, Vec<Value>>>>;

fn collect_years(state: &SiteState) -> YearsIndex {
    let mut years = YearsIndex::new();
    let Some(posts) = state.values.get("posts").and_then(Value::as_array) else {
        return years;
    };

    for post in posts {
        let Some(date) = post.get("date").and_then(Value::as_str) else {
            continue;
        };
        let Some((y, m, d)) = split_ymd(date) else {
            continue;
        };
        years
            .entry(y)
            .or_default()
            .entry(m)
            .or_default()
            .entry(d)
            .or_default()
            .push(post.clone());
    }
    years
}

/// `"2024-01-15..."` -> `(2024, 1, 15)`
fn split_ymd(date: &str) -> Option<(i32, u32, u32)> {
    let mut parts = date.get(..10)?.split('-');
    Some((
        parts.next()?.parse().ok()?,
        parts.next()?.parse().ok()?,
        parts.next()?.parse().ok()?,
    ))
}

/// Expose the nested years index in site state as `site.years`.
pub fn publish_years_index(state: &mut SiteState) {
    let years = collect_years(state);
    let mut out = Metadata::new();
    for (year, months) in &years {
        let mut month_map = Metadata::new();
        for (month, days) in months {
            let mut day_map = Metadata::new();
            for (day, posts) in days {
                day_map.insert(day.to_string(), Value::Array(posts.clone()));
            }
            month_map.insert(month.to_string(), Value::Object(day_map));
        }
        out.insert(year.to_string(), Value::Object(month_map));
    }
    state.values.insert("years".into(), Value::Object(out));
}

/// Generate year/month/day archive pages against the `date` layout.
///
/// Skips silently when no date layout exists.
pub fn generate_date_archives(
    engine: &mut Engine,
    config: &SiteConfig,
    documents: &FxHashMap<PathBuf, Document>,
    state: &SiteState,
) -> Vec<RenderedPage> {
    let layout_path = config.layout_rel_path("date");
    let Some(layout_doc) = documents.get(&layout_path) else {
        return Vec::new();
    };

    let years = collect_years(state);
    let mut pages = Vec::new();

    for (year, months) in &years {
        let mut year_posts = Vec::new();

        for (month, days) in months {
            let mut month_posts = Vec::new();

            for (day, posts) in days {
                month_posts.extend(posts.iter().cloned());
                let slug = format!("{year}/{month:02}/{day:02}");
                let date = format!("{year}-{month:02}-{day:02}");
                if let Some(page) = render_archive_page(
                    engine, config, documents, state, layout_doc,
                    posts.clone(), &slug, &date, "day",
                ) {
                    pages.push(page);
                }
            }

            year_posts.extend(month_posts.iter().cloned());
            let slug = format!("{year}/{month:02}");
            let date = format!("{year}-{month:02}-01");
            if let Some(page) = render_archive_page(
                engine, config, documents, state, layout_doc,
                month_posts, &slug, &date, "month",
            ) {
                pages.push(page);
            }
        }

        let slug = year.to_string();
        let date = format!("{year}-01-01");
        if let Some(page) = render_archive_page(
            engine, config, documents, state, layout_doc,
            year_posts, &slug, &date, "year",
        ) {
            pages.push(page);
        }
    }

    pages
}

#[allow(clippy::too_many_arguments)]
fn render_archive_page(
    engine: &mut Engine,
    config: &SiteConfig,
    documents: &FxHashMap<PathBuf, Document>,
    state: &SiteState,
    layout_doc: &Document,
    mut posts: Vec<Value>,
    slug: &str,
    date: &str,
    granularity: &str,
) -> Option<RenderedPage> {
    sort_posts_desc(&mut posts);

    let mut page_meta = layout_doc.metadata.clone();
    page_meta.insert("date".into(), Value::from(date));
    page_meta.insert("date_type".into(), Value::from(granularity));

    let mut ctx = state.page_view();
    ctx.insert("date".into(), Value::from(date));
    ctx.insert("date_type".into(), Value::from(granularity));
    ctx.insert("posts".into(), Value::Array(posts));
    ctx.insert("page".into(), Value::Object(page_meta.clone()));
    ctx.insert("site".into(), Value::Object(state.page_view()));

    let output_path = PathBuf::from(slug).join("index.html");
    wrap_and_emit(engine, config, documents, state, layout_doc, page_meta, ctx, output_path)
}

/// Generate one archive page per distinct value of `key` across all posts.
///
/// `template` names the layout; `root` is the output directory root.
pub fn generate_term_archives(
    engine: &mut Engine,
    config: &SiteConfig,
    documents: &FxHashMap<PathBuf, Document>,
    state: &SiteState,
    template: &str,
    key: &str,
    root: &str,
) -> Vec<RenderedPage> {
    let layout_path = config.layout_rel_path(template);
    let Some(layout_doc) = documents.get(&layout_path) else {
        return Vec::new();
    };

    let posts = state
        .values
        .get("posts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut terms: Vec<String> = Vec::new();
    for post in &posts {
        let Some(values) = post.get(key).and_then(Value::as_array) else {
            continue;
        };
        for value in values {
            if let Some(term) = value.as_str() {
                if !terms.iter().any(|t| t == term) {
                    terms.push(term.to_string());
                }
            }
        }
    }
    terms.sort();

    let mut pages = Vec::new();
    for term in terms {
        let matching: Vec<Value> = posts
            .iter()
            .filter(|p| {
                p.get(key)
                    .and_then(Value::as_array)
                    .is_some_and(|vs| vs.iter().any(|v| v.as_str() == Some(&term)))
            })
            .cloned()
            .collect();

        let mut page_meta = layout_doc.metadata.clone();
        page_meta.insert("category".into(), Value::from(term.clone()));
        page_meta.insert(
            "url".into(),
            Value::from(format!("{}/{root}/{}/", config.site.base_url, slugify(&term))),
        );

        let mut ctx = state.page_view();
        ctx.insert("category".into(), Value::from(term.clone()));
        ctx.insert("posts".into(), Value::Array(matching));
        ctx.insert("page".into(), Value::Object(page_meta.clone()));
        ctx.insert("site".into(), Value::Object(state.page_view()));

        let output_path = PathBuf::from(root).join(slugify(&term)).join("index.html");
        if let Some(page) = wrap_and_emit(
            engine, config, documents, state, layout_doc, page_meta, ctx, output_path,
        ) {
            pages.push(page);
        }
    }
    pages
}

/// Generate paginated pages for every configured collection.
pub fn generate_paginated_collections(
    engine: &mut Engine,
    config: &SiteConfig,
    documents: &FxHashMap<PathBuf, Document>,
    state: &SiteState,
) -> Vec<RenderedPage> {
    let mut pages = Vec::new();

    for (collection, spec) in &config.paginate {
        let Some(items) = state.values.get(collection).and_then(Value::as_array) else {
            continue;
        };
        if items.is_empty() || spec.per_page == 0 {
            continue;
        }

        let layout_path = config.layout_rel_path(&spec.template);
        let Some(layout_doc) = documents.get(&layout_path) else {
            log!("warn"; "pagination layout {} not found", layout_path.display());
            continue;
        };

        let mut items = items.clone();
        let all_dated = items.iter().all(|i| i.get("date").and_then(Value::as_str).is_some());
        if all_dated {
            sort_posts_desc(&mut items);
        } else {
            items.sort_by_key(|i| {
                std::cmp::Reverse(
                    i.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
                )
            });
        }

        for (index, chunk) in items.chunks(spec.per_page).enumerate() {
            let number = index + 1;
            let output_path = if number == 1 {
                PathBuf::from(&spec.template).join("index.html")
            } else {
                PathBuf::from(&spec.template)
                    .join(number.to_string())
                    .join("index.html")
            };

            let mut page_meta = layout_doc.metadata.clone();
            page_meta.insert("page_number".into(), Value::from(number));

            let mut ctx = state.page_view();
            ctx.insert("posts".into(), Value::Array(chunk.to_vec()));
            ctx.insert("current_page".into(), Value::Array(chunk.to_vec()));
            ctx.insert("page_number".into(), Value::from(number));
            ctx.insert("page".into(), Value::Object(page_meta.clone()));
            ctx.insert("site".into(), Value::Object(state.page_view()));

            if let Some(page) = wrap_and_emit(
                engine, config, documents, state, layout_doc,
                page_meta, ctx, output_path,
            ) {
                pages.push(page);
            }
        }
    }
    pages
}

/// Render a layout body with an archive context and wrap it in the
/// layout's own parent chain.
#[allow(clippy::too_many_arguments)]
fn wrap_and_emit(
    engine: &mut Engine,
    config: &SiteConfig,
    documents: &FxHashMap<PathBuf, Document>,
    state: &SiteState,
    layout_doc: &Document,
    page_meta: Metadata,
    ctx: Metadata,
    output_path: PathBuf,
) -> Option<RenderedPage> {
    let body = match engine.render(&layout_doc.body, &ctx) {
        Ok(html) => html,
        Err(err) => {
            log!("error"; "{}: {err:#}", output_path.display());
            return None;
        }
    };

    let html = layout::resolve(
        engine,
        config,
        documents,
        state,
        &ctx,
        &page_meta,
        body,
        output_path.as_path(),
    );

    Some(RenderedPage { output_path, html })
}

/// Descending lexicographic sort by `date` (ISO-shaped strings, so this is
/// chronological).
fn sort_posts_desc(posts: &mut [Value]) {
    posts.sort_by_key(|p| {
        std::cmp::Reverse(
            p.get("date").and_then(Value::as_str).unwrap_or_default().to_string(),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaginateSpec;

    fn post(slug: &str, date: &str, categories: &[&str]) -> Value {
        serde_json::json!({
            "slug": slug,
            "date": date,
            "title": slug,
            "categories": categories,
        })
    }

    fn state_with_posts(config: &SiteConfig, posts: Vec<Value>) -> SiteState {
        let mut state = SiteState::new(config);
        state.values.insert("posts".into(), Value::Array(posts));
        state
    }

    fn layout(rel: &str, raw: &str) -> (PathBuf, Document) {
        let path = PathBuf::from(rel);
        (path.clone(), Document::from_source(path, raw.to_string()))
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Writing"), "my-writing");
        assert_eq!(slugify("  Café Notes "), "cafe-notes");
    }

    #[test]
    fn test_date_archives_cover_all_granularities() {
        let config = SiteConfig::default();
        let state = state_with_posts(
            &config,
            vec![
                post("a", "2024-01-01", &[]),
                post("b", "2024-01-02", &[]),
            ],
        );
        let mut documents = FxHashMap::default();
        let (path, doc) = layout(
            "_layouts/date.html",
            "{% for p in posts %}{{ p.slug }};{% endfor %}",
        );
        documents.insert(path, doc);

        let mut engine = Engine::new();
        let pages = generate_date_archives(&mut engine, &config, &documents, &state);

        let by_path: FxHashMap<String, &RenderedPage> = pages
            .iter()
            .map(|p| (p.output_path.to_string_lossy().into_owned(), p))
            .collect();

        assert_eq!(by_path["2024/index.html"].html, "b;a;");
        assert_eq!(by_path["2024/01/index.html"].html, "b;a;");
        assert_eq!(by_path["2024/01/01/index.html"].html, "a;");
        assert_eq!(by_path["2024/01/02/index.html"].html, "b;");
    }

    #[test]
    fn test_date_archives_skip_without_layout() {
        let config = SiteConfig::default();
        let state = state_with_posts(&config, vec![post("a", "2024-01-01", &[])]);
        let mut engine = Engine::new();
        let pages =
            generate_date_archives(&mut engine, &config, &FxHashMap::default(), &state);
        assert!(pages.is_empty());
    }

    #[test]
    fn test_term_archives_filter_and_slugify() {
        let config = SiteConfig::default();
        let state = state_with_posts(
            &config,
            vec![
                post("a", "2024-01-01", &["My Writing"]),
                post("b", "2024-01-02", &["notes"]),
            ],
        );
        let mut documents = FxHashMap::default();
        let (path, doc) = layout(
            "_layouts/category.html",
            "{{ category }}: {% for p in posts %}{{ p.slug }}{% endfor %}",
        );
        documents.insert(path, doc);

        let mut engine = Engine::new();
        let pages = generate_term_archives(
            &mut engine, &config, &documents, &state, "category", "categories", "category",
        );

        assert_eq!(pages.len(), 2);
        let writing = pages
            .iter()
            .find(|p| p.output_path == PathBuf::from("category/my-writing/index.html"))
            .unwrap();
        assert_eq!(writing.html, "My Writing: a");
    }

    #[test]
    fn test_pagination_slices_and_paths() {
        let mut config = SiteConfig::default();
        config.paginate.insert(
            "posts".into(),
            PaginateSpec {
                per_page: 10,
                template: "blog".into(),
            },
        );

        let posts: Vec<Value> = (0..25)
            .map(|i| post(&format!("p{i:02}"), &format!("2024-01-{:02}", i % 28 + 1), &[]))
            .collect();
        let state = state_with_posts(&config, posts);

        let mut documents = FxHashMap::default();
        let (path, doc) = layout(
            "_layouts/blog.html",
            "{{ page_number }}:{{ posts | length }}",
        );
        documents.insert(path, doc);

        let mut engine = Engine::new();
        let pages =
            generate_paginated_collections(&mut engine, &config, &documents, &state);

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].output_path, PathBuf::from("blog/index.html"));
        assert_eq!(pages[1].output_path, PathBuf::from("blog/2/index.html"));
        assert_eq!(pages[2].output_path, PathBuf::from("blog/3/index.html"));
        assert_eq!(pages[0].html, "1:10");
        assert_eq!(pages[1].html, "2:10");
        assert_eq!(pages[2].html, "3:5");
    }

    #[test]
    fn test_years_index_published() {
        let config = SiteConfig::default();
        let mut state = state_with_posts(
            &config,
            vec![post("a", "2024-01-01", &[]), post("b", "2023-06-10", &[])],
        );
        publish_years_index(&mut state);

        let years = state.values["years"].as_object().unwrap();
        assert!(years.contains_key("2024"));
        assert_eq!(years["2023"]["6"]["10"].as_array().unwrap().len(), 1);
    }
}
