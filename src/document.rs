//! Documents: the in-memory representation of one source file or one
//! structured data record.
//!
//! A `Document` carries its source path (stable identity), its parsed
//! front-matter metadata and its body. Metadata is an ordered JSON object;
//! accessors return `None`/empty defaults for absent keys so a document
//! with no front matter never breaks downstream evaluation.

use serde_json::Value;
use std::path::{Path, PathBuf};

/// Ordered metadata mapping, shared by documents, buckets and page state.
pub type Metadata = serde_json::Map<String, Value>;

/// How a document's body is turned into HTML at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Markdown body, converted directly to HTML
    Markdown,
    /// Template body, executed with page/site context
    Template,
    /// Synthetic document from a data record; body is empty
    Data,
}

/// One source file or data record.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the source tree root. Stable identity.
    pub source: PathBuf,
    /// Raw file content as read from disk (empty for data records)
    pub raw: String,
    /// Parsed front matter plus computed fields
    pub metadata: Metadata,
    /// Content below the front matter block
    pub body: String,
    /// Body rendering mode
    pub kind: DocumentKind,
}

impl Document {
    /// Build a document from raw file content, splitting front matter.
    pub fn from_source(source: PathBuf, raw: String) -> Self {
        let kind = kind_for_path(&source);
        let (metadata, body) = split_front_matter(&raw);
        Self {
            source,
            raw,
            metadata,
            body,
            kind,
        }
    }

    /// Build a synthetic document from a structured data record.
    ///
    /// The record itself becomes the front matter; a `body` key, if present,
    /// is hoisted into the body content.
    pub fn from_record(source: PathBuf, mut record: Metadata) -> Self {
        let body = match record.remove("body") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Self {
            source,
            raw: String::new(),
            metadata: record,
            body,
            kind: DocumentKind::Data,
        }
    }

    /// String metadata value, or `None` when absent or non-string.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Whether a metadata flag is set truthy.
    pub fn meta_flag(&self, key: &str) -> bool {
        match self.metadata.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

/// Decide rendering mode from the file extension.
fn kind_for_path(path: &Path) -> DocumentKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") => DocumentKind::Markdown,
        _ => DocumentKind::Template,
    }
}

/// Split a `---` delimited YAML front-matter block from body content.
///
/// Content without a leading front-matter fence is returned with empty
/// metadata. An unparsable block is also treated as absent metadata rather
/// than an error; the text stays in the body so nothing is silently lost.
pub fn split_front_matter(raw: &str) -> (Metadata, String) {
    let Some(rest) = raw.strip_prefix("---") else {
        return (Metadata::new(), raw.to_string());
    };
    let rest = rest.strip_prefix('\r').unwrap_or(rest);
    let Some(rest) = rest.strip_prefix('\n') else {
        return (Metadata::new(), raw.to_string());
    };

    let Some((fence_start, fence_len)) = find_closing_fence(rest) else {
        return (Metadata::new(), raw.to_string());
    };

    let block = &rest[..fence_start];
    let body = &rest[fence_start + fence_len..];

    match parse_yaml_object(block) {
        Some(metadata) => (metadata, body.to_string()),
        None => (Metadata::new(), raw.to_string()),
    }
}

/// Find the closing `---` fence line: returns (offset, line length).
fn find_closing_fence(s: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    for line in s.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((offset, line.len()));
        }
        offset += line.len();
    }
    None
}

/// Parse a YAML mapping into ordered JSON metadata. Returns `None` for
/// malformed YAML or non-mapping documents.
fn parse_yaml_object(block: &str) -> Option<Metadata> {
    if block.trim().is_empty() {
        return Some(Metadata::new());
    }
    let yaml: serde_yaml_ng::Value = serde_yaml_ng::from_str(block).ok()?;
    match yaml_to_json(yaml) {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Convert a YAML value into a JSON value.
pub fn yaml_to_json(value: serde_yaml_ng::Value) -> Value {
    match value {
        serde_yaml_ng::Value::Null => Value::Null,
        serde_yaml_ng::Value::Bool(b) => Value::Bool(b),
        serde_yaml_ng::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
            } else {
                Value::Null
            }
        }
        serde_yaml_ng::Value::String(s) => Value::String(s),
        serde_yaml_ng::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml_ng::Value::Mapping(map) => {
            let mut object = Metadata::new();
            for (key, value) in map {
                let key = match key {
                    serde_yaml_ng::Value::String(s) => s,
                    other => serde_yaml_ng::to_string(&other)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default(),
                };
                object.insert(key, yaml_to_json(value));
            }
            Value::Object(object)
        }
        serde_yaml_ng::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_front_matter_basic() {
        let raw = "---\ntitle: Hello\nlayout: post\n---\n# Body\n";
        let (meta, body) = split_front_matter(raw);
        assert_eq!(meta["title"], "Hello");
        assert_eq!(meta["layout"], "post");
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn test_split_front_matter_absent() {
        let raw = "# Just markdown\n\nNo front matter here.\n";
        let (meta, body) = split_front_matter(raw);
        assert!(meta.is_empty());
        assert_eq!(body, raw);
    }

    #[test]
    fn test_split_front_matter_malformed_yaml() {
        let raw = "---\ntitle: [unclosed\n---\nbody\n";
        let (meta, body) = split_front_matter(raw);
        // Malformed block: treated as no front matter, content preserved
        assert!(meta.is_empty());
        assert_eq!(body, raw);
    }

    #[test]
    fn test_split_front_matter_unterminated() {
        let raw = "---\ntitle: Hello\nno closing fence";
        let (meta, body) = split_front_matter(raw);
        assert!(meta.is_empty());
        assert_eq!(body, raw);
    }

    #[test]
    fn test_split_front_matter_lists() {
        let raw = "---\ncategories:\n  - writing\n  - notes\n---\nbody";
        let (meta, _) = split_front_matter(raw);
        assert_eq!(meta["categories"], serde_json::json!(["writing", "notes"]));
    }

    #[test]
    fn test_document_kind_from_extension() {
        assert_eq!(kind_for_path(Path::new("posts/a.md")), DocumentKind::Markdown);
        assert_eq!(
            kind_for_path(Path::new("templates/index.html")),
            DocumentKind::Template
        );
        assert_eq!(kind_for_path(Path::new("feed.xml")), DocumentKind::Template);
    }

    #[test]
    fn test_from_record_hoists_body() {
        let mut record = Metadata::new();
        record.insert("slug".into(), Value::from("one"));
        record.insert("body".into(), Value::from("record body"));
        let doc = Document::from_record(PathBuf::from("pianos/one/index.html"), record);
        assert_eq!(doc.body, "record body");
        assert!(doc.metadata.get("body").is_none());
        assert_eq!(doc.kind, DocumentKind::Data);
    }

    #[test]
    fn test_meta_flag_variants() {
        let raw = "---\nskip: true\nnoindex: yes\n---\n";
        let (metadata, _) = split_front_matter(raw);
        let doc = Document {
            source: PathBuf::from("a.html"),
            raw: String::new(),
            metadata,
            body: String::new(),
            kind: DocumentKind::Template,
        };
        assert!(doc.meta_flag("skip"));
        assert!(!doc.meta_flag("missing"));
    }
}
