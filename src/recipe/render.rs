// src/recipe/render.rs

//! Render a recipe as an equivalent Dockerfile
//!
//! Consecutive shell steps are folded into a single `RUN` instruction so
//! the output produces one image layer per privilege context, the way a
//! hand-written Dockerfile for the same layer would.

use crate::environment::{APT_LISTS_DIR, TRUSTED_KEYS_DIR};
use crate::error::Result;
use crate::recipe::format::{BuildStep, Recipe, WriteMode, source_line};
use crate::repository::gpg::{lookup_url, normalize_fingerprint};

/// Shell expression used for `%(codename)s` when the recipe does not pin it
const SHELL_CODENAME: &str = "$(lsb_release -sc)";

/// Quote a value for use inside double quotes in a shell command
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Shell command equivalent of a resolved step, if it is a shell step
pub fn shell_command(step: &BuildStep) -> Result<Option<String>> {
    Ok(Some(match step {
        BuildStep::AddSource {
            url,
            suite,
            components,
            path,
            mode,
        } => {
            let redirect = match mode {
                WriteMode::Append => ">>",
                WriteMode::Replace => ">",
            };
            format!(
                "echo {} {} {}",
                quote(&source_line(url, suite, components)),
                redirect,
                path
            )
        }
        BuildStep::ImportKey {
            keyserver,
            fingerprint,
        } => {
            let fingerprint = normalize_fingerprint(fingerprint)?;
            format!(
                "curl -fsSL {} -o /{}/{}.asc",
                quote(&lookup_url(keyserver, &fingerprint)?),
                TRUSTED_KEYS_DIR,
                fingerprint
            )
        }
        BuildStep::RefreshIndex => "apt-get update".to_string(),
        BuildStep::Install { packages } => {
            format!("apt-get install -y -q {}", packages.join(" "))
        }
        BuildStep::CleanCache => format!("apt-get clean && rm -rf /{}/*", APT_LISTS_DIR),
        BuildStep::Download {
            url,
            path,
            checksum,
        } => {
            let mut cmd = format!("curl -fsSL -o {} {}", path, quote(url));
            if let Some(digest) = checksum.as_deref().and_then(|c| c.strip_prefix("sha256:")) {
                cmd.push_str(&format!(
                    " && echo \"{}  {}\" | sha256sum -c -",
                    digest, path
                ));
            }
            cmd
        }
        BuildStep::Run { command } => command.clone(),
        BuildStep::Symlink { target, link } => format!("ln -sfn {} {}", target, link),
        BuildStep::SetUser { .. } | BuildStep::SetEnv { .. } => return Ok(None),
    }))
}

/// Render the recipe as Dockerfile text
pub fn render_dockerfile(recipe: &Recipe) -> Result<String> {
    let mut out = String::new();
    out.push_str(&format!("# {}\n", recipe.image.name));
    if let Some(description) = &recipe.image.description {
        out.push_str(&format!("# {}\n", description));
    }
    out.push_str(&format!("FROM {}\n", recipe.image.base));

    let mut pending: Vec<String> = Vec::new();
    let flush = |out: &mut String, pending: &mut Vec<String>| {
        if !pending.is_empty() {
            out.push_str(&format!("\nRUN {}\n", pending.join(" \\\n    && ")));
            pending.clear();
        }
    };

    for step in &recipe.steps {
        let resolved = recipe.resolve_step(step, Some(SHELL_CODENAME))?;
        match &resolved {
            BuildStep::SetUser { name } => {
                flush(&mut out, &mut pending);
                out.push_str(&format!("\nUSER {}\n", name));
            }
            BuildStep::SetEnv { name, value } => {
                flush(&mut out, &mut pending);
                out.push_str(&format!("\nENV {}={}\n", name, quote(value)));
            }
            other => {
                if let Some(cmd) = shell_command(other)? {
                    pending.push(cmd);
                }
            }
        }
    }
    flush(&mut out, &mut pending);

    Ok(out)
}
