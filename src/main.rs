// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { recipe } => commands::cmd_validate(&recipe),
        Commands::Plan { recipe } => commands::cmd_plan(&recipe),
        Commands::Apply {
            recipe,
            root,
            dry_run,
            json,
            quiet,
            timeout,
            retries,
        } => commands::cmd_apply(
            &recipe,
            commands::ApplyOptions {
                root,
                dry_run,
                json,
                quiet,
                timeout,
                retries,
            },
        ),
        Commands::Render { recipe, output } => commands::cmd_render(&recipe, output.as_deref()),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "provision", &mut std::io::stdout());
            Ok(())
        }
    }
}
