//! Site scaffolding for `borealis new <name>`.
//!
//! Creates the default project structure with a starter config, layout,
//! home template and first post.

use anyhow::{Context, Result, bail};
use chrono::Local;
use std::{fs, path::Path};

/// Default config filename
const CONFIG_FILE: &str = "borealis.toml";

/// Default site directory structure
const SITE_DIRS: &[&str] = &[
    "pages/_layouts",
    "pages/_data",
    "pages/posts",
    "pages/templates",
    "assets",
];

const DEFAULT_CONFIG: &str = r#"[site]
base_url = ""
environment = "local"

[build]
pages = "pages"
layouts = "_layouts"
data = "_data"
output = "_site"
assets = "assets"
"#;

const DEFAULT_LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>{{ page.title }}</title>
  </head>
  <body>
    {{ content }}
  </body>
</html>
"#;

const DEFAULT_INDEX: &str = r#"---
title: Home
layout: default
---
<h1>Welcome</h1>
<ul>
  {% for post in site.posts %}
    <li><a href="{{ post.url }}">{{ post.title }}</a></li>
  {% endfor %}
</ul>
"#;

const DEFAULT_POST_BODY: &str = r#"---
title: Hello World
layout: default
---
This is your first post.
"#;

/// Create a new site skeleton in the named directory.
pub fn new_site(root: &Path) -> Result<()> {
    if root.exists() && fs::read_dir(root)?.next().is_some() {
        bail!("{} already exists and is not empty", root.display());
    }

    for dir in SITE_DIRS {
        let path = root.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }

    write_new(root, CONFIG_FILE, DEFAULT_CONFIG)?;
    write_new(root, "pages/_layouts/default.html", DEFAULT_LAYOUT)?;
    write_new(root, "pages/templates/index.html", DEFAULT_INDEX)?;

    let post_name = format!(
        "pages/posts/{}-hello-world.md",
        Local::now().format("%Y-%m-%d")
    );
    write_new(root, &post_name, DEFAULT_POST_BODY)?;

    crate::log!("new"; "created site at {}", root.display());
    Ok(())
}

fn write_new(root: &Path, rel: &str, content: &str) -> Result<()> {
    let path = root.join(rel);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}
