// src/executor/config.rs

//! Configuration for applying a recipe

use crate::environment::{Environment, SimulatedEnvironment, SystemEnvironment};
use crate::error::Result;
use crate::repository::{HTTP_TIMEOUT, HttpClient, MAX_RETRIES};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Where and how a recipe is applied
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Root of the target filesystem (`/` for the running system)
    pub root: PathBuf,
    /// Timeout for key and file downloads
    pub http_timeout: Duration,
    /// Attempts per download before giving up
    pub http_retries: u32,
    /// Apply to a simulated image instead of the real target
    pub dry_run: bool,
    /// Codename assumed by a dry run when the recipe does not pin one
    pub dry_run_codename: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            http_timeout: HTTP_TIMEOUT,
            http_retries: MAX_RETRIES,
            dry_run: false,
            dry_run_codename: "bionic".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Set the target root
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Open the environment this configuration targets
    pub fn open_environment(&self) -> Result<Box<dyn Environment>> {
        if self.dry_run {
            info!("Dry run: applying to a simulated image");
            return Ok(Box::new(
                SimulatedEnvironment::permissive().with_codename(&self.dry_run_codename),
            ));
        }

        let client = HttpClient::with_settings(self.http_timeout, self.http_retries)?;
        Ok(Box::new(SystemEnvironment::new(self.root.clone(), client)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.root, PathBuf::from("/"));
        assert_eq!(config.http_retries, MAX_RETRIES);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_dry_run_environment() {
        let config = ExecutorConfig::default()
            .with_root("/does/not/matter")
            .with_dry_run(true);
        let env = config.open_environment().unwrap();
        assert!(env.describe().contains("simulated"));
        assert_eq!(env.codename().unwrap(), "bionic");
    }
}
