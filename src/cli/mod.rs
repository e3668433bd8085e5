// src/cli/mod.rs
//! CLI definitions for the provision tool
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! - `validate` - Load and check a recipe
//! - `plan` - Show what a recipe would do, step by step
//! - `apply` - Apply a recipe to a root filesystem (or a simulated one)
//! - `render` - Emit an equivalent Dockerfile
//! - `completions` - Generate shell completion scripts

use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "provision")]
#[command(author = "Provisioner Contributors")]
#[command(version)]
#[command(about = "Apply declarative package-manager recipes to a base image", long_about = None)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate a recipe, printing any warnings
    Validate {
        /// Path to the recipe file
        recipe: String,
    },

    /// Show the ordered steps, their effective user and the commands they run
    Plan {
        /// Path to the recipe file
        recipe: String,
    },

    /// Apply a recipe to the target
    Apply {
        /// Path to the recipe file
        recipe: String,

        /// Root of the target filesystem
        #[arg(short, long, default_value = "/")]
        root: String,

        /// Apply to a simulated image instead of the target
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Do not show progress bars
        #[arg(short, long)]
        quiet: bool,

        /// Timeout for key and file downloads, in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Attempts per download
        #[arg(long, default_value = "3")]
        retries: u32,
    },

    /// Render a recipe as an equivalent Dockerfile
    Render {
        /// Path to the recipe file
        recipe: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}
