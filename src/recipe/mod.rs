// src/recipe/mod.rs

//! Recipe system for provisioning image layers
//!
//! A recipe names the base image a layer is applied onto and lists the
//! steps that produce it, in order:
//! - Switching the active identity (`set-user`)
//! - Adding package sources and their trust keys
//! - Refreshing the package index and installing packages
//! - Cleaning package-manager state out of the layer
//!
//! # Example Recipe
//!
//! ```toml
//! [image]
//! name = "runner-java"
//! base = "samber/github-actions-runner:latest"
//!
//! [[step]]
//! action = "set-user"
//! name = "root"
//!
//! [[step]]
//! action = "add-source"
//! url = "https://dl.bintray.com/sbt/debian"
//! path = "/etc/apt/sources.list.d/sbt.list"
//!
//! [[step]]
//! action = "import-key"
//! keyserver = "https://keyserver.ubuntu.com"
//! fingerprint = "2EE0EA64E40A89B84B2DF73499E82A75642AC823"
//!
//! [[step]]
//! action = "refresh-index"
//!
//! [[step]]
//! action = "install"
//! packages = ["default-jdk", "maven", "gradle", "sbt"]
//!
//! [[step]]
//! action = "clean-cache"
//!
//! [[step]]
//! action = "set-user"
//! name = "runner"
//! ```

mod format;
pub mod parser;
pub mod render;

pub use format::{
    placeholders, source_line, BuildStep, ImageSection, Recipe, WriteMode, DEFAULT_INITIAL_USER,
};
pub use parser::{
    load_recipe_file, parse_recipe, parse_recipe_file, validate_recipe, PRIVILEGED_USER,
};
pub use render::{render_dockerfile, shell_command};
