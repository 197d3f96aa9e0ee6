//! Global site state: the shared context visible to every template render.
//!
//! One `SiteState` is created per build invocation, seeded with
//! configuration defaults, populated during metadata evaluation, and read
//! by every page render and archive generator. Per-page rendering takes a
//! shallow copy of the value map (`page_view`) so per-page fields never
//! leak between renders while bucket contents stay shared.
//!
//! Bucket registration is keyed by permalink: re-registering the same
//! permalink replaces the existing entry instead of appending, which is
//! what keeps incremental re-evaluation idempotent.

use crate::{config::SiteConfig, document::Metadata, log};
use chrono::Local;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Per-bucket permalink→index map, maintained alongside each bucket so
/// that re-registration replaces rather than duplicates.
type BucketIndex = FxHashMap<String, FxHashMap<String, usize>>;

/// The process-wide site state for one build invocation.
#[derive(Debug, Default)]
pub struct SiteState {
    /// All template-visible values: posts, pages, buckets, collections,
    /// data records, archive indices
    pub values: Metadata,
    /// Documents contributing to each bucket/collection, used by the
    /// dependency analyzer to expand global-state reads
    contributors: FxHashMap<String, Vec<PathBuf>>,
    /// permalink→index per layout bucket
    layout_index: BucketIndex,
    /// permalink→index per collection
    collection_index: BucketIndex,
    /// Final URLs already listed in `pages` (one listing entry per URL)
    seen_urls: FxHashSet<String>,
    /// Final permalink → source files that produced it (duplicate report)
    permalink_files: FxHashMap<String, Vec<PathBuf>>,
}

impl SiteState {
    /// Initialize state with configuration defaults.
    pub fn new(config: &SiteConfig) -> Self {
        let now = Local::now();
        let mut values = Metadata::new();
        values.insert("posts".into(), Value::Array(Vec::new()));
        values.insert("pages".into(), Value::Array(Vec::new()));
        values.insert("root_url".into(), Value::from(config.site.base_url.clone()));
        values.insert(
            "build_date".into(),
            Value::from(now.format("%m-%d").to_string()),
        );
        values.insert(
            "build_timestamp".into(),
            Value::from(now.naive_local().format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        );
        values.insert(
            "environment".into(),
            Value::from(config.site.environment.clone()),
        );

        for (key, value) in config.extra_state() {
            values.insert(key, value);
        }

        Self {
            values,
            ..Self::default()
        }
    }

    /// Whether a top-level state key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Documents contributing to a bucket or collection, if any.
    pub fn contributors(&self, bucket: &str) -> Option<&[PathBuf]> {
        self.contributors.get(bucket).map(Vec::as_slice)
    }

    /// All bucket names with at least one contributing document.
    pub fn contributor_buckets(&self) -> impl Iterator<Item = &String> {
        self.contributors.keys()
    }

    /// Record that `source` contributes to `bucket` (data-file collections
    /// register through here at load time).
    pub fn add_contributor(&mut self, bucket: &str, source: &Path) {
        let entry = self.contributors.entry(bucket.to_string()).or_default();
        if !entry.iter().any(|p| p == source) {
            entry.push(source.to_path_buf());
        }
    }

    /// Register a document into a layout bucket (`{layout}s`), keyed by
    /// permalink: a second registration with the same permalink replaces
    /// the first entry.
    pub fn register_layout_member(
        &mut self,
        layout: &str,
        permalink: &str,
        metadata: Metadata,
        source: &Path,
    ) {
        let bucket = format!("{layout}s");
        Self::register_member(
            &mut self.values,
            &mut self.layout_index,
            &bucket,
            permalink,
            metadata,
        );
        self.add_contributor(&bucket, source);
    }

    /// Register a document into a named collection (case-insensitive name),
    /// with the same permalink-dedup semantics as layout buckets.
    pub fn register_collection_member(
        &mut self,
        collection: &str,
        permalink: &str,
        metadata: Metadata,
        source: &Path,
    ) {
        let bucket = collection.to_lowercase();
        Self::register_member(
            &mut self.values,
            &mut self.collection_index,
            &bucket,
            permalink,
            metadata,
        );
        self.add_contributor(&bucket, source);
    }

    fn register_member(
        values: &mut Metadata,
        index: &mut BucketIndex,
        bucket: &str,
        permalink: &str,
        metadata: Metadata,
    ) {
        let entry = values
            .entry(bucket.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(items) = entry else {
            return;
        };

        let bucket_index = index.entry(bucket.to_string()).or_default();
        match bucket_index.get(permalink) {
            Some(&idx) if idx < items.len() => {
                items[idx] = Value::Object(metadata);
            }
            _ => {
                items.push(Value::Object(metadata));
                bucket_index.insert(permalink.to_string(), items.len() - 1);
            }
        }
    }

    /// Number of entries in a bucket. Zero when absent.
    pub fn bucket_len(&self, bucket: &str) -> usize {
        self.values
            .get(bucket)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Append a post's metadata to `posts`, permalink-deduplicated like
    /// the buckets so re-evaluation replaces instead of duplicating.
    pub fn register_post(&mut self, permalink: &str, metadata: Metadata, source: &Path) {
        Self::register_member(
            &mut self.values,
            &mut self.layout_index,
            "posts",
            permalink,
            metadata,
        );
        self.add_contributor("posts", source);
    }

    /// Sort `posts` descending by date (slug date refined by `hms`),
    /// falling back to slug.
    pub fn sort_posts(&mut self) {
        if let Some(Value::Array(posts)) = self.values.get_mut("posts") {
            posts.sort_by_key(|p| {
                let key = post_sort_key(p);
                std::cmp::Reverse(key)
            });
            // Sorting invalidates stored indices for the posts bucket
            self.layout_index.remove("posts");
        }
    }

    /// Add a listing entry for a rendered page, one per unique final URL.
    ///
    /// Returns false (and leaves the listing untouched) when the URL was
    /// already listed.
    pub fn add_page_entry(&mut self, url: &str, entry: Metadata) -> bool {
        if !self.seen_urls.insert(url.to_string()) {
            return false;
        }
        if let Some(Value::Array(pages)) = self.values.get_mut("pages") {
            pages.push(Value::Object(entry));
        }
        true
    }

    /// Record which source file produced a final output permalink.
    pub fn record_permalink(&mut self, permalink: &str, source: &Path) {
        let files = self.permalink_files.entry(permalink.to_string()).or_default();
        if !files.iter().any(|p| p == source) {
            files.push(source.to_path_buf());
        }
    }

    /// Warn about every output permalink produced by more than one source.
    pub fn warn_duplicate_permalinks(&self) {
        for (permalink, files) in &self.permalink_files {
            if files.len() > 1 {
                let list = files
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                log!("warn"; "{permalink} has multiple source files: {list}");
            }
        }
    }

    /// Shallow copy of the value map for one page render. Nested arrays
    /// and objects are cloned JSON values, so mutation of page-level keys
    /// cannot contaminate other renders.
    pub fn page_view(&self) -> Metadata {
        self.values.clone()
    }
}

/// Sort key for a post: `date` string (already zero-padded, so the
/// lexicographic order is chronological), with `hms` appended when set.
fn post_sort_key(post: &Value) -> String {
    let date = post
        .get("date")
        .and_then(Value::as_str)
        .or_else(|| post.get("slug").and_then(Value::as_str))
        .unwrap_or_default();
    match post.get("hms").and_then(Value::as_str) {
        Some(hms) => format!("{date}-{hms}"),
        None => date.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_register_layout_member_dedup() {
        let config = SiteConfig::default();
        let mut state = SiteState::new(&config);
        let source = Path::new("posts/a.md");

        state.register_layout_member("post", "/a/", meta(&[("title", "first")]), source);
        assert_eq!(state.bucket_len("posts"), 1);

        // Same permalink again: replaced, not duplicated
        state.register_layout_member("post", "/a/", meta(&[("title", "second")]), source);
        assert_eq!(state.bucket_len("posts"), 1);
        let title = state.values["posts"][0]["title"].as_str().unwrap();
        assert_eq!(title, "second");

        state.register_layout_member("post", "/b/", meta(&[("title", "third")]), source);
        assert_eq!(state.bucket_len("posts"), 2);
    }

    #[test]
    fn test_register_collection_case_insensitive() {
        let config = SiteConfig::default();
        let mut state = SiteState::new(&config);
        let source = Path::new("pianos/one/index.html");

        state.register_collection_member("Pianos", "/one/", meta(&[("slug", "one")]), source);
        state.register_collection_member("pianos", "/one/", meta(&[("slug", "one")]), source);
        assert_eq!(state.bucket_len("pianos"), 1);
        assert!(state.contains("pianos"));
        assert!(!state.contains("Pianos"));
    }

    #[test]
    fn test_contributors_tracked_once() {
        let config = SiteConfig::default();
        let mut state = SiteState::new(&config);
        let source = Path::new("posts/a.md");

        state.register_layout_member("post", "/a/", Metadata::new(), source);
        state.register_layout_member("post", "/a/", Metadata::new(), source);
        assert_eq!(state.contributors("posts").unwrap(), &[source.to_path_buf()]);
    }

    #[test]
    fn test_page_entry_unique_urls() {
        let config = SiteConfig::default();
        let mut state = SiteState::new(&config);

        assert!(state.add_page_entry("/a/", meta(&[("title", "A")])));
        assert!(!state.add_page_entry("/a/", meta(&[("title", "A again")])));
        let pages = state.values["pages"].as_array().unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_sort_posts_descending_with_hms() {
        let config = SiteConfig::default();
        let mut state = SiteState::new(&config);
        let source = Path::new("posts/x.md");

        let mut early = Metadata::new();
        early.insert("date".into(), json!("2024-01-01"));
        early.insert("slug".into(), json!("early"));
        let mut late = Metadata::new();
        late.insert("date".into(), json!("2024-01-02"));
        late.insert("slug".into(), json!("late"));

        state.register_post("/early/", early, source);
        state.register_post("/late/", late, source);
        state.sort_posts();

        let posts = state.values["posts"].as_array().unwrap();
        assert_eq!(posts[0]["slug"], "late");
        assert_eq!(posts[1]["slug"], "early");
    }

    #[test]
    fn test_page_view_isolated() {
        let config = SiteConfig::default();
        let mut state = SiteState::new(&config);
        let mut view = state.page_view();
        view.insert("page".into(), json!({"url": "/x/"}));
        assert!(!state.contains("page"));
        // Bucket contents are still visible in fresh views
        state.register_layout_member("post", "/a/", Metadata::new(), Path::new("a.md"));
        assert_eq!(state.page_view()["posts"].as_array().unwrap().len(), 1);
    }
}
