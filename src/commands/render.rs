// src/commands/render.rs

//! Render command - emit an equivalent Dockerfile

use anyhow::{Context, Result};
use provisioner::recipe::render_dockerfile;
use std::fs;
use tracing::info;

/// Render a recipe as a Dockerfile to stdout or a file
pub fn cmd_render(recipe_path: &str, output: Option<&str>) -> Result<()> {
    let (recipe, _) = super::load(recipe_path)?;
    let text = render_dockerfile(&recipe)
        .with_context(|| format!("Failed to render {}", recipe.image.name))?;

    match output {
        Some(path) => {
            fs::write(path, &text).with_context(|| format!("Failed to write {}", path))?;
            info!("Wrote Dockerfile for {} to {}", recipe.image.name, path);
        }
        None => print!("{}", text),
    }
    Ok(())
}
