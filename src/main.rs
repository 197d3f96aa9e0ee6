//! Borealis - a dependency-aware incremental static site generator.

mod archives;
mod build;
mod cli;
mod config;
mod deps;
mod document;
mod engine;
mod eval;
mod filters;
mod graph;
mod hooks;
mod incremental;
mod layout;
mod loader;
mod logger;
mod new_site;
mod render;
mod serve;
mod state;
mod watch;

use anyhow::Result;
use build::Site;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use new_site::new_site;
use serve::serve_site;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::New { name } = &cli.command {
        return new_site(name);
    }

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::New { .. } => unreachable!(),
        Commands::Build { incremental } => Site::new(config).build(*incremental),
        Commands::Serve { .. } => {
            let mut site = Site::new(config.clone());
            site.build(false)?;

            std::thread::spawn(move || {
                if let Err(err) = watch::watch_for_changes_blocking(site) {
                    crate::log!("watch"; "watcher stopped: {err:#}");
                }
            });

            serve_site(&config)
        }
    }
}

/// Load and validate configuration from CLI arguments. A missing or
/// unparsable config file is the one fatal startup error.
fn load_config(cli: &Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = SiteConfig::from_path(&config_path)?;
    config.update_with_cli(cli);
    Ok(config)
}
