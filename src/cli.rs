//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Borealis static site generator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory (defaults to the current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: borealis.toml)
    #[arg(short = 'C', long, default_value = "borealis.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Scaffold a new site in the named directory
    New {
        /// the name (path) of the site directory
        name: PathBuf,
    },

    /// Build the site once
    Build {
        /// Only rebuild documents affected by changes since the last build
        #[arg(long)]
        incremental: bool,
    },

    /// Build the site, then watch for changes and serve the output locally
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,
    },
}
