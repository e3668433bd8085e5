// src/commands/plan.rs

//! Plan command - show what a recipe does, step by step

use anyhow::{Context, Result};
use provisioner::BuildStep;
use provisioner::recipe::shell_command;

/// Stand-in for the target codename, which is only known at apply time
const PLAN_CODENAME: &str = "<codename>";

/// Print the ordered steps with the identity each runs as
pub fn cmd_plan(recipe_path: &str) -> Result<()> {
    let (recipe, _) = super::load(recipe_path)?;

    println!("Plan for {} (base {}):", recipe.image.name, recipe.image.base);

    let mut user = recipe.image.user.clone();
    for (index, step) in recipe.steps.iter().enumerate() {
        let resolved = recipe
            .resolve_step(step, Some(PLAN_CODENAME))
            .with_context(|| format!("Step {} ({})", index, step.kind()))?;

        println!("  [{}] {:<8} {}", index, user, resolved);
        if let Some(command) = shell_command(&resolved)? {
            println!("        $ {}", command);
        }

        if let BuildStep::SetUser { name } = &resolved {
            user = name.clone();
        }
    }

    println!("Final user: {}", user);
    Ok(())
}
