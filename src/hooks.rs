//! Typed extension-point registry.
//!
//! External code extends the build at four fixed points:
//!
//! | Phase            | Signature                                      |
//! |------------------|------------------------------------------------|
//! | pre-render       | `(path, page_state, site) -> page_state`       |
//! | post-render      | `(path, page_state, site, html) -> html`       |
//! | post-build       | `(site)`                                       |
//! | template filters | registered by name on the engine               |
//!
//! Hooks run in registration order. The registry is populated once at
//! startup and read by the render driver; no dynamic lookup happens during
//! a build.

use crate::{document::Metadata, engine::Engine, state::SiteState};
use std::path::Path;

pub type PreRenderHook = Box<dyn Fn(&Path, Metadata, &SiteState) -> Metadata + Send + Sync>;
pub type PostRenderHook = Box<dyn Fn(&Path, &Metadata, &SiteState, String) -> String + Send + Sync>;
pub type PostBuildHook = Box<dyn Fn(&SiteState) + Send + Sync>;

/// Ordered hook lists per phase, plus template filters pending
/// installation on the engine.
#[derive(Default)]
pub struct HookRegistry {
    pre_render: Vec<PreRenderHook>,
    post_render: Vec<PostRenderHook>,
    post_build: Vec<PostBuildHook>,
    filters: Vec<(String, Box<dyn tera::Filter>)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pre_render<F>(&mut self, hook: F)
    where
        F: Fn(&Path, Metadata, &SiteState) -> Metadata + Send + Sync + 'static,
    {
        self.pre_render.push(Box::new(hook));
    }

    pub fn on_post_render<F>(&mut self, hook: F)
    where
        F: Fn(&Path, &Metadata, &SiteState, String) -> String + Send + Sync + 'static,
    {
        self.post_render.push(Box::new(hook));
    }

    pub fn on_post_build<F>(&mut self, hook: F)
    where
        F: Fn(&SiteState) + Send + Sync + 'static,
    {
        self.post_build.push(Box::new(hook));
    }

    pub fn add_filter<F>(&mut self, name: &str, filter: F)
    where
        F: tera::Filter + 'static,
    {
        self.filters.push((name.to_string(), Box::new(filter)));
    }

    /// Move pending template filters onto the engine.
    pub fn install_filters(&mut self, engine: &mut Engine) {
        for (name, filter) in self.filters.drain(..) {
            engine.register_boxed_filter(&name, filter);
        }
    }

    /// Run every pre-render hook over the page state, in order.
    pub fn run_pre_render(&self, path: &Path, mut page_state: Metadata, site: &SiteState) -> Metadata {
        for hook in &self.pre_render {
            page_state = hook(path, page_state, site);
        }
        page_state
    }

    /// Run every post-render hook over the rendered HTML, in order.
    pub fn run_post_render(
        &self,
        path: &Path,
        page_state: &Metadata,
        site: &SiteState,
        mut html: String,
    ) -> String {
        for hook in &self.post_render {
            html = hook(path, page_state, site, html);
        }
        html
    }

    /// Run every post-build hook against the final site state.
    pub fn run_post_build(&self, site: &SiteState) {
        for hook in &self.post_build {
            hook(site);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use serde_json::Value;

    #[test]
    fn test_pre_render_hooks_run_in_order() {
        let mut hooks = HookRegistry::new();
        hooks.on_pre_render(|_, mut state, _| {
            state.insert("a".into(), Value::from("first"));
            state
        });
        hooks.on_pre_render(|_, mut state, _| {
            state.insert("a".into(), Value::from("second"));
            state
        });

        let site = SiteState::new(&SiteConfig::default());
        let out = hooks.run_pre_render(Path::new("x.html"), Metadata::new(), &site);
        assert_eq!(out["a"], "second");
    }

    #[test]
    fn test_post_render_hook_rewrites_html() {
        let mut hooks = HookRegistry::new();
        hooks.on_post_render(|_, _, _, html| html.replace("draft", "final"));

        let site = SiteState::new(&SiteConfig::default());
        let out = hooks.run_post_render(
            Path::new("x.html"),
            &Metadata::new(),
            &site,
            "a draft page".into(),
        );
        assert_eq!(out, "a final page");
    }
}
