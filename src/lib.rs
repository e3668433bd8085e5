// src/lib.rs

//! Provisioner
//!
//! Declarative image-layer provisioning: a recipe describes the base image a
//! layer is built on and an ordered list of package-manager steps (switch
//! user, add sources, trust signing keys, refresh, install, clean up). The
//! executor applies those steps once, in order, and stops at the first
//! failure.
//!
//! # Architecture
//!
//! - Recipes: TOML documents parsed and validated up front
//! - Environments: the target behind a trait (real apt root or simulation)
//! - Executor: strictly sequential, fail-fast, reports the failing step
//! - Privilege: `set-user root` must precede every privileged step and the
//!   layer must end unprivileged

pub mod environment;
mod error;
pub mod executor;
pub mod hash;
pub mod progress;
pub mod recipe;
pub mod repository;

pub use environment::{Environment, SimulatedEnvironment, StepContext, SystemEnvironment};
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorConfig, RunReport, RunStatus, StepRecord};
pub use progress::{LogProgress, ProgressTracker, SilentProgress};
pub use recipe::{
    BuildStep, PRIVILEGED_USER, Recipe, load_recipe_file, parse_recipe, parse_recipe_file,
    validate_recipe,
};
