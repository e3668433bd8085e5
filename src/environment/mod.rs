// src/environment/mod.rs

//! Target environments that recipe steps are applied to
//!
//! The executor talks to its target only through the [`Environment`] trait:
//! - [`SystemEnvironment`]: apt/dpkg on a real root filesystem (`/` or a
//!   chroot directory)
//! - [`SimulatedEnvironment`]: an in-memory model used for dry runs and tests
//!
//! Privilege is enforced by the executor before a privileged operation is
//! dispatched, so implementations may assume those calls run as root.

mod apt;
mod simulated;
mod system;

pub use apt::{classify_apt_failure, parse_os_release_codename, passwd_has_user};
pub use simulated::SimulatedEnvironment;
pub use system::SystemEnvironment;

use crate::error::Result;
use crate::recipe::WriteMode;
use std::collections::BTreeMap;

/// Trusted key directory, relative to the target root
pub const TRUSTED_KEYS_DIR: &str = "etc/apt/trusted.gpg.d";

/// Downloaded package index directory, relative to the target root
pub const APT_LISTS_DIR: &str = "var/lib/apt/lists";

/// Context a step runs in: the active identity and the variables defined
/// by earlier `set-env` steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub user: String,
    pub env: BTreeMap<String, String>,
}

impl StepContext {
    /// Context for the first step of a run
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            env: BTreeMap::new(),
        }
    }
}

/// Result of an install step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Packages installed by this step
    pub newly_installed: Vec<String>,
    /// Packages that were already present
    pub already_installed: Vec<String>,
}

/// A target the executor applies steps to
///
/// Operations that modify state return whether anything changed, so a
/// second run of the same recipe can be reported as a no-op.
pub trait Environment {
    /// Short human-readable description of the target
    fn describe(&self) -> String;

    /// Release codename of the target distribution
    fn codename(&self) -> Result<String>;

    /// Whether an identity exists in the target
    fn has_user(&self, name: &str) -> Result<bool>;

    /// Write a source declaration into a list file
    fn add_source(&mut self, path: &str, line: &str, mode: WriteMode) -> Result<bool>;

    /// Fetch, verify and register a signing key
    fn import_key(&mut self, keyserver: &str, fingerprint: &str) -> Result<bool>;

    /// Re-synchronize package metadata with all configured sources
    fn refresh_index(&mut self) -> Result<()>;

    /// Install packages; all-or-nothing on resolution failure
    fn install_packages(&mut self, packages: &[String]) -> Result<InstallOutcome>;

    /// Remove transient package-manager state
    fn clean_cache(&mut self) -> Result<()>;

    /// Fetch a file into the target, optionally checking a `sha256:` digest
    fn download(&mut self, url: &str, path: &str, checksum: Option<&str>) -> Result<()>;

    /// Run a shell command in the given context
    fn run(&mut self, ctx: &StepContext, command: &str) -> Result<()>;

    /// Create or replace a symbolic link
    fn symlink(&mut self, target: &str, link: &str) -> Result<bool>;

    /// Subset of `packages` currently installed
    fn installed_packages(&self, packages: &[String]) -> Result<Vec<String>>;
}
