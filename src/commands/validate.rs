// src/commands/validate.rs

//! Validate command - check a recipe without applying it

use anyhow::Result;

/// Validate a recipe and report the outcome
pub fn cmd_validate(recipe_path: &str) -> Result<()> {
    let (recipe, warnings) = super::load(recipe_path)?;

    println!(
        "Recipe: {} on {} ({} steps)",
        recipe.image.name,
        recipe.image.base,
        recipe.steps.len()
    );
    if warnings.is_empty() {
        println!("[OK] No issues found");
    } else {
        println!("[OK] {} warning(s)", warnings.len());
    }
    Ok(())
}
