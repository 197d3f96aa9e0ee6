//! Site configuration management for `borealis.toml`.
//!
//! # Sections
//!
//! | Section      | Purpose                                          |
//! |--------------|--------------------------------------------------|
//! | `[site]`     | Base URL and environment name                    |
//! | `[build]`    | Source, layout, data, asset and output paths     |
//! | `[archives]` | Date/category/tag archive switches and roots     |
//! | `[paginate]` | Per-collection pagination specs                  |
//! | `[serve]`    | Development server (interface, port)             |
//! | `[extra]`    | Free-form overrides merged into site state       |
//!
//! # Example
//!
//! ```toml
//! [site]
//! base_url = "https://example.com"
//!
//! [build]
//! root = "pages"
//! output = "_site"
//!
//! [paginate.posts]
//! per_page = 10
//! template = "blog"
//!
//! [extra]
//! author = "Alice"
//! ```

use crate::cli::{Cli, Commands};
use anyhow::Result;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Source file extensions admitted by the document loader.
pub const ALLOWED_EXTENSIONS: &[&str] = &["html", "md", "css", "js", "txt", "xml"];

/// Configuration errors. The only fatal error class: everything else in a
/// build is logged per-document and skipped.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    Missing(PathBuf),
    #[error("Failed to read config {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Invalid config {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing borealis.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    /// Basic site information
    #[serde(default)]
    pub site: SiteSection,

    /// Build paths
    #[serde(default)]
    pub build: BuildSection,

    /// Archive generation switches
    #[serde(default)]
    pub archives: ArchiveSection,

    /// Pagination specs keyed by collection name
    #[serde(default)]
    pub paginate: BTreeMap<String, PaginateSpec>,

    /// Data collections whose records get no standalone page
    #[serde(default)]
    pub disable_single_page_generation: Vec<String>,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeSection,

    /// Free-form site-state overrides
    #[serde(default)]
    pub extra: BTreeMap<String, toml::Value>,
}

/// Basic site information
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    /// Base URL prepended to every generated link
    pub base_url: String,
    /// Environment name exposed to templates as `site.environment`
    pub environment: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            environment: "local".into(),
        }
    }
}

/// Build paths, all relative to the project root until normalized.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Source tree containing templates, posts, layouts and data
    pub pages: PathBuf,
    /// Layout directory name, under the source tree
    pub layouts: PathBuf,
    /// Data-file directory name, under the source tree
    pub data: PathBuf,
    /// Output directory
    pub output: PathBuf,
    /// Static asset directory, copied verbatim
    pub assets: PathBuf,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            pages: "pages".into(),
            layouts: "_layouts".into(),
            data: "_data".into(),
            output: "_site".into(),
            assets: "assets".into(),
        }
    }
}

/// Archive generation switches and template/slug roots.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveSection {
    /// Generate /{year}[/{month}[/{day}]]/index.html date archives
    pub dates: bool,
    /// Generate category archive pages
    pub categories: bool,
    /// Generate tag archive pages
    pub tags: bool,
    /// Layout name used for category archives
    pub category_template: String,
    /// Output root for category archives
    pub category_root: String,
    /// Layout name used for tag archives
    pub tag_template: String,
    /// Output root for tag archives
    pub tag_root: String,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        Self {
            dates: true,
            categories: true,
            tags: true,
            category_template: "category".into(),
            category_root: "category".into(),
            tag_template: "tag".into(),
            tag_root: "tag".into(),
        }
    }
}

/// Pagination spec for one collection.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginateSpec {
    /// Items per page
    pub per_page: usize,
    /// Layout name and output root for the paginated pages
    pub template: String,
}

/// Development server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServeSection {
    pub interface: String,
    pub port: u16,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            interface: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

impl SiteConfig {
    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: SiteConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_str(&content, path)
    }

    /// Apply CLI arguments and normalize all paths relative to the root.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("."));
        self.root = root;

        if let Commands::Serve { interface, port } = &cli.command {
            if let Some(interface) = interface {
                self.serve.interface = interface.clone();
            }
            if let Some(port) = port {
                self.serve.port = *port;
            }
        }
    }

    /// Source tree root, e.g. `<root>/pages`.
    pub fn pages_dir(&self) -> PathBuf {
        self.root.join(&self.build.pages)
    }

    /// Layout directory, e.g. `<root>/pages/_layouts`.
    pub fn layouts_dir(&self) -> PathBuf {
        self.pages_dir().join(&self.build.layouts)
    }

    /// Data-file directory, e.g. `<root>/pages/_data`.
    pub fn data_dir(&self) -> PathBuf {
        self.pages_dir().join(&self.build.data)
    }

    /// Output directory, e.g. `<root>/_site`.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.build.output)
    }

    /// Asset directory, e.g. `<root>/assets`.
    pub fn assets_dir(&self) -> PathBuf {
        self.root.join(&self.build.assets)
    }

    /// Fingerprint record path, persisted between incremental builds.
    pub fn fingerprint_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    /// Layout file path for a layout name: `{layouts}/{name}.html`,
    /// relative to the source tree root.
    pub fn layout_rel_path(&self, layout: &str) -> PathBuf {
        self.build.layouts.join(format!("{layout}.html"))
    }

    /// `[extra]` table converted to JSON values for seeding site state.
    pub fn extra_state(&self) -> Vec<(String, serde_json::Value)> {
        self.extra
            .iter()
            .map(|(k, v)| (k.clone(), toml_to_json(v)))
            .collect()
    }
}

/// Convert a TOML value into a JSON value for site-state seeding.
fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::from(*i),
        toml::Value::Float(f) => {
            serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Datetime(d) => serde_json::Value::String(d.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SiteConfig::default();
        assert_eq!(config.build.pages, PathBuf::from("pages"));
        assert_eq!(config.build.layouts, PathBuf::from("_layouts"));
        assert_eq!(config.build.output, PathBuf::from("_site"));
        assert_eq!(config.site.environment, "local");
        assert!(config.archives.dates);
        assert!(config.paginate.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [site]
            base_url = "https://example.com"

            [build]
            output = "public"

            [archives]
            tags = false

            [paginate.posts]
            per_page = 10
            template = "blog"

            [extra]
            author = "Alice"
        "#;
        let config = SiteConfig::from_str(toml, Path::new("borealis.toml")).unwrap();
        assert_eq!(config.site.base_url, "https://example.com");
        assert_eq!(config.build.output, PathBuf::from("public"));
        assert!(!config.archives.tags);
        assert_eq!(config.paginate["posts"].per_page, 10);
        assert_eq!(config.paginate["posts"].template, "blog");
        assert_eq!(
            config.extra_state(),
            vec![("author".to_string(), serde_json::json!("Alice"))]
        );
    }

    #[test]
    fn test_missing_config_is_fatal() {
        let err = SiteConfig::from_path(Path::new("/nonexistent/borealis.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_layout_rel_path() {
        let config = SiteConfig::default();
        assert_eq!(
            config.layout_rel_path("post"),
            PathBuf::from("_layouts/post.html")
        );
    }

    #[test]
    fn test_toml_to_json_nested() {
        let value: toml::Value = toml::from_str(
            r#"
            enable = true
            count = 3
            [inner]
            name = "x"
        "#,
        )
        .unwrap();
        let json = toml_to_json(&value);
        assert_eq!(json["enable"], serde_json::json!(true));
        assert_eq!(json["count"], serde_json::json!(3));
        assert_eq!(json["inner"]["name"], serde_json::json!("x"));
    }
}
