// src/commands/apply.rs

//! Apply command - run a recipe against the target

use super::progress::StepProgress;
use anyhow::{Context, Result};
use provisioner::{
    Executor, ExecutorConfig, LogProgress, ProgressTracker, RunReport, SilentProgress,
};
use std::io::IsTerminal;
use std::time::Duration;
use tracing::info;

/// Flags for `apply`
pub struct ApplyOptions {
    pub root: String,
    pub dry_run: bool,
    pub json: bool,
    pub quiet: bool,
    pub timeout: u64,
    pub retries: u32,
}

/// Apply a recipe and print the outcome
pub fn cmd_apply(recipe_path: &str, options: ApplyOptions) -> Result<()> {
    let (recipe, _) = super::load(recipe_path)?;

    let mut config = ExecutorConfig {
        http_timeout: Duration::from_secs(options.timeout),
        http_retries: options.retries,
        ..Default::default()
    }
    .with_root(&options.root)
    .with_dry_run(options.dry_run);
    if let Some(codename) = recipe.variables.get("codename") {
        config.dry_run_codename = codename.clone();
    }

    let mut env = config
        .open_environment()
        .with_context(|| format!("Failed to open target {}", options.root))?;

    let progress: Box<dyn ProgressTracker> = if options.quiet || options.json {
        Box::new(SilentProgress::new())
    } else if std::io::stderr().is_terminal() {
        Box::new(StepProgress::new(&recipe.image.name))
    } else {
        Box::new(LogProgress::new(recipe.image.name.clone()))
    };

    let mut executor = Executor::new(env.as_mut()).with_progress(progress);
    let result = executor.run(&recipe);

    if options.json {
        if let Some(report) = executor.report() {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }

    let report = result.with_context(|| format!("Failed to apply {}", recipe.image.name))?;
    if !options.json && !options.quiet {
        print_summary(&report);
    }

    info!("Applied {} to {}", report.image, report.target);
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!(
        "\n{}: {} step(s), {} changed the target",
        report.image,
        report.steps.len(),
        report.changed_steps()
    );
    if report.installed.is_empty() {
        println!("  No new packages installed");
    } else {
        println!("  Installed: {}", report.installed.join(", "));
    }
    println!("  Final user: {}", report.final_user);
}
