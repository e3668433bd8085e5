// src/commands/mod.rs
//! Command handlers for the provision CLI

mod apply;
mod plan;
pub mod progress;
mod render;
mod validate;

pub use apply::{ApplyOptions, cmd_apply};
pub use plan::cmd_plan;
pub use render::cmd_render;
pub use validate::cmd_validate;

use anyhow::{Context, Result};
use provisioner::{Recipe, parse_recipe_file, validate_recipe};
use std::path::Path;

/// Parse and validate a recipe, printing warnings
fn load(recipe_path: &str) -> Result<(Recipe, Vec<String>)> {
    let path = Path::new(recipe_path);
    let recipe = parse_recipe_file(path)
        .with_context(|| format!("Failed to parse recipe: {}", path.display()))?;
    let warnings = validate_recipe(&recipe)
        .with_context(|| format!("Recipe validation failed: {}", path.display()))?;

    for warning in &warnings {
        eprintln!("Warning: {}", warning);
    }
    Ok((recipe, warnings))
}
