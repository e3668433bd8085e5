// src/executor/mod.rs

//! Sequential step executor
//!
//! Applies the steps of a [`Recipe`] to an [`Environment`] strictly in
//! declaration order. The run stops at the first failing step, which is
//! reported as [`Error::ExecutionError`] carrying the step index; nothing is
//! retried or rolled back.
//!
//! # Example
//!
//! ```rust,ignore
//! use provisioner::{Executor, ExecutorConfig, load_recipe_file};
//!
//! let recipe = load_recipe_file(Path::new("recipes/java-runner.toml"))?;
//! let mut env = ExecutorConfig::default().open_environment()?;
//! let report = Executor::new(env.as_mut()).run(&recipe)?;
//! assert_eq!(report.final_user, "runner");
//! ```

mod config;
mod report;

pub use config::ExecutorConfig;
pub use report::{RunReport, RunStatus, StepRecord};

use crate::environment::{Environment, StepContext};
use crate::error::{Error, Result};
use crate::progress::{ProgressTracker, SilentProgress};
use crate::recipe::{BuildStep, PRIVILEGED_USER, Recipe, source_line};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Applies recipes to one environment
pub struct Executor<'a> {
    env: &'a mut dyn Environment,
    progress: Box<dyn ProgressTracker>,
    report: Option<RunReport>,
}

impl<'a> Executor<'a> {
    pub fn new(env: &'a mut dyn Environment) -> Self {
        Self {
            env,
            progress: Box::new(SilentProgress::new()),
            report: None,
        }
    }

    /// Report progress through `progress` instead of silently
    pub fn with_progress(mut self, progress: Box<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    /// Report of the most recent run, including a failed one
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    /// Apply every step of `recipe` in order
    pub fn run(&mut self, recipe: &Recipe) -> Result<RunReport> {
        let total = recipe.steps.len();
        let mut report = RunReport::new(
            &recipe.image.name,
            &recipe.image.base,
            self.env.describe(),
            &recipe.image.user,
        );
        let mut ctx = StepContext::new(recipe.image.user.as_str());
        let mut codename: Option<String> = None;

        info!(
            "Applying {} ({} steps) onto {}",
            recipe.image.name,
            total,
            self.env.describe()
        );
        self.progress.set_length(total as u64);

        for (index, step) in recipe.steps.iter().enumerate() {
            let started = Instant::now();
            let user = ctx.user.clone();

            let result = self
                .resolve(recipe, step, &mut codename)
                .and_then(|resolved| {
                    info!("[{}/{}] {} (as {})", index + 1, total, resolved, ctx.user);
                    self.progress.set_message(&resolved.to_string());
                    let changed = self.apply(&resolved, &mut ctx, &mut report.installed)?;
                    Ok((resolved, changed))
                });

            match result {
                Ok((resolved, changed)) => {
                    report.steps.push(StepRecord {
                        index,
                        action: step.kind().to_string(),
                        description: resolved.to_string(),
                        user,
                        changed,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                    report.final_user = ctx.user.clone();
                    self.progress.increment(1);
                }
                Err(e) => {
                    let err = e.at_step(index, step.kind());
                    report.status = RunStatus::Failed {
                        index,
                        message: err.root_cause().to_string(),
                    };
                    self.progress.finish_with_error(&err.to_string());
                    self.report = Some(report);
                    return Err(err);
                }
            }
        }

        if ctx.user == PRIVILEGED_USER {
            warn!("Run finished with {} active", PRIVILEGED_USER);
        }

        report.status = RunStatus::Done;
        self.progress.finish_with_message(&format!(
            "{} applied, {} of {} steps changed the target",
            recipe.image.name,
            report.changed_steps(),
            total
        ));
        self.report = Some(report.clone());
        Ok(report)
    }

    /// Substitute placeholders, asking the target for its codename only
    /// when a step needs it
    fn resolve(
        &self,
        recipe: &Recipe,
        step: &BuildStep,
        codename: &mut Option<String>,
    ) -> Result<BuildStep> {
        let needs_codename = !recipe.variables.contains_key("codename")
            && step.placeholders()?.iter().any(|n| n == "codename");

        if needs_codename && codename.is_none() {
            let found = self.env.codename()?;
            debug!("Target codename is {}", found);
            *codename = Some(found);
        }

        recipe.resolve_step(step, codename.as_deref())
    }

    /// Apply one resolved step; returns whether it changed the target
    fn apply(
        &mut self,
        step: &BuildStep,
        ctx: &mut StepContext,
        installed: &mut Vec<String>,
    ) -> Result<bool> {
        if step.requires_privilege() && ctx.user != PRIVILEGED_USER {
            return Err(Error::PermissionDenied(format!(
                "{} requires {} but '{}' is active",
                step.kind(),
                PRIVILEGED_USER,
                ctx.user
            )));
        }

        match step {
            BuildStep::SetUser { name } => {
                if !self.env.has_user(name)? {
                    return Err(Error::NotFound(format!("User '{}' does not exist", name)));
                }
                let changed = ctx.user != *name;
                ctx.user = name.clone();
                Ok(changed)
            }
            BuildStep::AddSource {
                url,
                suite,
                components,
                path,
                mode,
            } => self
                .env
                .add_source(path, &source_line(url, suite, components), *mode),
            BuildStep::ImportKey {
                keyserver,
                fingerprint,
            } => self.env.import_key(keyserver, fingerprint),
            BuildStep::RefreshIndex => {
                self.env.refresh_index()?;
                Ok(true)
            }
            BuildStep::Install { packages } => {
                let outcome = self.env.install_packages(packages)?;
                if !outcome.already_installed.is_empty() {
                    debug!("Already installed: {}", outcome.already_installed.join(", "));
                }
                let changed = !outcome.newly_installed.is_empty();
                installed.extend(outcome.newly_installed);
                Ok(changed)
            }
            BuildStep::CleanCache => {
                self.env.clean_cache()?;
                Ok(true)
            }
            BuildStep::Download {
                url,
                path,
                checksum,
            } => {
                self.env.download(url, path, checksum.as_deref())?;
                Ok(true)
            }
            BuildStep::Run { command } => {
                self.env.run(ctx, command)?;
                Ok(true)
            }
            BuildStep::Symlink { target, link } => self.env.symlink(target, link),
            BuildStep::SetEnv { name, value } => {
                let previous = ctx.env.insert(name.clone(), value.clone());
                Ok(previous.as_deref() != Some(value.as_str()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::SimulatedEnvironment;
    use crate::recipe::parse_recipe;

    fn recipe(steps: &str) -> Recipe {
        parse_recipe(&format!(
            "[image]\nname = \"test\"\nbase = \"ubuntu:18.04\"\n{}",
            steps
        ))
        .unwrap()
    }

    #[test]
    fn test_privileged_step_without_root() {
        let recipe = recipe(
            r#"
[[step]]
action = "refresh-index"
"#,
        );
        let mut env = SimulatedEnvironment::new();
        let err = Executor::new(&mut env).run(&recipe).unwrap_err();

        assert_eq!(err.step_index(), Some(0));
        assert!(matches!(err.root_cause(), Error::PermissionDenied(_)));
        assert!(env.journal().is_empty());
    }

    #[test]
    fn test_unknown_user() {
        let recipe = recipe(
            r#"
[[step]]
action = "set-user"
name = "jenkins"
"#,
        );
        let mut env = SimulatedEnvironment::new();
        let mut executor = Executor::new(&mut env);
        let err = executor.run(&recipe).unwrap_err();

        assert!(matches!(err.root_cause(), Error::NotFound(_)));
        let report = executor.report().unwrap();
        assert_eq!(report.failed_at(), Some(0));
        assert_eq!(report.final_user, "runner");
    }

    #[test]
    fn test_codename_from_target() {
        let recipe = recipe(
            r#"
[[step]]
action = "set-user"
name = "root"

[[step]]
action = "add-source"
url = "https://packages.sury.org/php/"
suite = "%(codename)s"
components = ["main"]
path = "/etc/apt/sources.list.d/php.list"

[[step]]
action = "set-user"
name = "runner"
"#,
        );
        let mut env = SimulatedEnvironment::new().with_codename("focal");
        Executor::new(&mut env).run(&recipe).unwrap();

        assert_eq!(
            env.file("/etc/apt/sources.list.d/php.list"),
            Some("deb https://packages.sury.org/php/ focal main\n")
        );
    }

    #[test]
    fn test_set_env_reaches_run() {
        let recipe = recipe(
            r#"
[[step]]
action = "set-env"
name = "COMPOSER_HOME"
value = "/opt/composer"

[[step]]
action = "run"
command = "echo $COMPOSER_HOME"
"#,
        );
        let mut env = SimulatedEnvironment::new();
        let report = Executor::new(&mut env).run(&recipe).unwrap();

        assert!(report.succeeded());
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[1].user, "runner");
        assert_eq!(env.commands_run()[0].1, "echo $COMPOSER_HOME");
    }
}
