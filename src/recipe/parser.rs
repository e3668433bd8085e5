// src/recipe/parser.rs

//! Recipe file parsing and validation

use crate::error::{Error, Result};
use crate::hash::parse_checksum;
use crate::recipe::format::{BuildStep, Recipe};
use crate::repository::gpg::{lookup_url, normalize_fingerprint};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;
use url::Url;

/// Identity allowed to run privileged steps
pub const PRIVILEGED_USER: &str = "root";

/// Stand-in used for `%(codename)s` when checking a recipe without a target
const VALIDATION_CODENAME: &str = "stable";

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read recipe file: {}", e)))?;

    parse_recipe(&content)
}

/// Parse and validate a recipe file, logging any warnings
pub fn load_recipe_file(path: &Path) -> Result<Recipe> {
    let recipe = parse_recipe_file(path)?;
    for warning in validate_recipe(&recipe)? {
        warn!("{}: {}", path.display(), warning);
    }
    Ok(recipe)
}

fn step_error(index: usize, step: &BuildStep, message: impl AsRef<str>) -> Error {
    Error::ParseError(format!("Step {} ({}): {}", index, step.kind(), message.as_ref()))
}

fn check_url(index: usize, step: &BuildStep, url: &str) -> Result<()> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| step_error(index, step, format!("invalid URL '{}': {}", url, e)))
}

fn check_absolute(index: usize, step: &BuildStep, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(step_error(index, step, format!("path '{}' must be absolute", path)));
    }
    Ok(())
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a recipe for completeness and correctness
///
/// Structural problems are returned as [`Error::ParseError`]; advisory
/// findings come back as warnings. The privilege rule is checked by
/// replaying `set-user` transitions from the image's initial identity.
pub fn validate_recipe(recipe: &Recipe) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if recipe.image.name.trim().is_empty() {
        return Err(Error::ParseError("Recipe image name cannot be empty".to_string()));
    }
    if recipe.image.base.trim().is_empty() {
        return Err(Error::ParseError("Recipe base image cannot be empty".to_string()));
    }
    if recipe.image.user.trim().is_empty() {
        return Err(Error::ParseError("Recipe initial user cannot be empty".to_string()));
    }
    if recipe.steps.is_empty() {
        return Err(Error::ParseError("Recipe has no steps".to_string()));
    }

    let known = recipe.known_variables();
    let mut active_user = recipe.image.user.clone();
    // Last add-source/import-key not yet followed by refresh-index
    let mut unrefreshed_change: Option<usize> = None;
    // Last add-source not yet followed by refresh-index
    let mut unrefreshed_source: Option<usize> = None;
    let mut last_install: Option<usize> = None;
    let mut cleaned_after_install = false;

    for (index, step) in recipe.steps.iter().enumerate() {
        for name in step.placeholders()? {
            if !known.contains(name.as_str()) {
                return Err(step_error(index, step, format!("unknown variable '%({})s'", name)));
            }
        }

        if step.requires_privilege() && active_user != PRIVILEGED_USER {
            return Err(step_error(
                index,
                step,
                format!(
                    "requires '{}' but runs as '{}'; add a set-user step first",
                    PRIVILEGED_USER, active_user
                ),
            ));
        }

        let resolved = recipe.resolve_step(step, Some(VALIDATION_CODENAME))?;

        match &resolved {
            BuildStep::SetUser { name } => {
                if name.trim().is_empty() {
                    return Err(step_error(index, step, "user name cannot be empty"));
                }
                if *name == active_user {
                    warnings.push(format!(
                        "Step {} switches to '{}', which is already active",
                        index, name
                    ));
                }
                active_user = name.clone();
            }
            BuildStep::AddSource {
                url, suite, path, ..
            } => {
                check_url(index, step, url)?;
                if suite.trim().is_empty() {
                    return Err(step_error(index, step, "suite cannot be empty"));
                }
                check_absolute(index, step, path)?;
                unrefreshed_change = Some(index);
                unrefreshed_source = Some(index);
            }
            BuildStep::ImportKey {
                keyserver,
                fingerprint,
            } => {
                let fingerprint = normalize_fingerprint(fingerprint)
                    .map_err(|e| step_error(index, step, e.to_string()))?;
                lookup_url(keyserver, &fingerprint)
                    .map_err(|e| step_error(index, step, e.to_string()))?;
                unrefreshed_change = Some(index);
            }
            BuildStep::RefreshIndex => {
                unrefreshed_change = None;
                unrefreshed_source = None;
            }
            BuildStep::Install { packages } => {
                if packages.is_empty() {
                    return Err(step_error(index, step, "package list cannot be empty"));
                }
                if let Some(changed) = unrefreshed_change {
                    warnings.push(format!(
                        "Step {} installs packages without a refresh-index after step {}",
                        index, changed
                    ));
                }
                if let BuildStep::Install { packages: raw } = step {
                    let mut seen = HashSet::new();
                    for entry in raw {
                        let expanded = recipe.substitute(entry, Some(VALIDATION_CODENAME))?;
                        for word in expanded.split_whitespace() {
                            if !seen.insert(word.to_string()) {
                                warnings.push(format!(
                                    "Step {} lists package '{}' more than once",
                                    index, word
                                ));
                            }
                        }
                    }
                }
                last_install = Some(index);
                cleaned_after_install = false;
            }
            BuildStep::CleanCache => {
                cleaned_after_install = true;
            }
            BuildStep::Download {
                url,
                path,
                checksum,
            } => {
                check_url(index, step, url)?;
                check_absolute(index, step, path)?;
                if let Some(checksum) = checksum {
                    parse_checksum(checksum).map_err(|e| step_error(index, step, e.to_string()))?;
                }
            }
            BuildStep::Run { command } => {
                if command.trim().is_empty() {
                    return Err(step_error(index, step, "command cannot be empty"));
                }
            }
            BuildStep::Symlink { target, link } => {
                if target.trim().is_empty() {
                    return Err(step_error(index, step, "symlink target cannot be empty"));
                }
                check_absolute(index, step, link)?;
            }
            BuildStep::SetEnv { name, .. } => {
                if !is_env_name(name) {
                    return Err(step_error(
                        index,
                        step,
                        format!("'{}' is not a valid environment variable name", name),
                    ));
                }
            }
        }
    }

    if let Some(added) = unrefreshed_source {
        warnings.push(format!(
            "Source added at step {} is never followed by refresh-index",
            added
        ));
    }

    if let Some(install) = last_install {
        if !cleaned_after_install {
            warnings.push(format!(
                "No clean-cache after the install at step {}; package lists stay in the image",
                install
            ));
        }
    }

    let last_index = recipe.steps.len() - 1;
    match &recipe.steps[last_index] {
        BuildStep::SetUser { .. } if active_user != PRIVILEGED_USER => {}
        BuildStep::SetUser { .. } => {
            return Err(Error::ParseError(format!(
                "Recipe must end unprivileged, but the final step switches to '{}'",
                PRIVILEGED_USER
            )));
        }
        other => {
            return Err(Error::ParseError(format!(
                "Recipe must end with a set-user step to an unprivileged user, found {} at step {}",
                other.kind(),
                last_index
            )));
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAVA_RECIPE: &str = r#"
[image]
name = "runner-java"
base = "samber/github-actions-runner:latest"

[[step]]
action = "set-user"
name = "root"

[[step]]
action = "add-source"
url = "https://dl.bintray.com/sbt/debian"
path = "/etc/apt/sources.list.d/sbt.list"

[[step]]
action = "import-key"
keyserver = "https://keyserver.ubuntu.com"
fingerprint = "2EE0EA64E40A89B84B2DF73499E82A75642AC823"

[[step]]
action = "refresh-index"

[[step]]
action = "install"
packages = ["default-jdk", "maven", "gradle", "sbt"]

[[step]]
action = "clean-cache"

[[step]]
action = "set-user"
name = "runner"
"#;

    fn with_steps(steps: &str) -> String {
        format!(
            "[image]\nname = \"t\"\nbase = \"debian:stable\"\n\n{}",
            steps
        )
    }

    #[test]
    fn test_parse_valid_recipe() {
        let recipe = parse_recipe(JAVA_RECIPE).unwrap();
        assert_eq!(recipe.image.name, "runner-java");
        assert_eq!(recipe.image.user, "runner");
        assert_eq!(recipe.steps.len(), 7);
        assert_eq!(
            recipe.steps.iter().map(|s| s.kind()).collect::<Vec<_>>(),
            vec![
                "set-user",
                "add-source",
                "import-key",
                "refresh-index",
                "install",
                "clean-cache",
                "set-user"
            ]
        );
        assert!(validate_recipe(&recipe).unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_recipe() {
        assert!(parse_recipe("this is not valid toml at all {}").is_err());
    }

    #[test]
    fn test_parse_unknown_action() {
        let content = with_steps("[[step]]\naction = \"reboot\"\n");
        let err = parse_recipe(&content).unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_validate_requires_root_for_privileged_step() {
        let content = with_steps(
            r#"
[[step]]
action = "refresh-index"

[[step]]
action = "set-user"
name = "runner"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        let err = validate_recipe(&recipe).unwrap_err();
        assert!(err.to_string().contains("Step 0 (refresh-index)"));
    }

    #[test]
    fn test_validate_initial_root_user() {
        let content = r#"
[image]
name = "t"
base = "debian:stable"
user = "root"

[[step]]
action = "clean-cache"

[[step]]
action = "set-user"
name = "nobody"
"#;
        let recipe = parse_recipe(content).unwrap();
        assert!(validate_recipe(&recipe).is_ok());
    }

    #[test]
    fn test_validate_must_end_unprivileged() {
        let content = with_steps(
            r#"
[[step]]
action = "set-user"
name = "root"

[[step]]
action = "clean-cache"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());

        let content = with_steps(
            r#"
[[step]]
action = "set-user"
name = "root"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        let err = validate_recipe(&recipe).unwrap_err();
        assert!(err.to_string().contains("end unprivileged"));
    }

    #[test]
    fn test_validate_bad_fingerprint() {
        let content = with_steps(
            r#"
[[step]]
action = "set-user"
name = "root"

[[step]]
action = "import-key"
keyserver = "https://keyserver.ubuntu.com"
fingerprint = "642AC823"

[[step]]
action = "set-user"
name = "runner"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        let err = validate_recipe(&recipe).unwrap_err();
        assert!(err.to_string().contains("Step 1 (import-key)"));
    }

    #[test]
    fn test_validate_unknown_variable() {
        let content = with_steps(
            r#"
[[step]]
action = "set-user"
name = "root"

[[step]]
action = "install"
packages = ["%(packages)s"]

[[step]]
action = "set-user"
name = "runner"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_empty_install() {
        let content = with_steps(
            r#"
[[step]]
action = "set-user"
name = "root"

[[step]]
action = "install"
packages = []

[[step]]
action = "set-user"
name = "runner"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_relative_path() {
        let content = with_steps(
            r#"
[[step]]
action = "set-user"
name = "root"

[[step]]
action = "add-source"
url = "https://dl.bintray.com/sbt/debian"
path = "etc/apt/sources.list.d/sbt.list"

[[step]]
action = "set-user"
name = "runner"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let content = with_steps(
            r#"
[[step]]
action = "set-user"
name = "root"

[[step]]
action = "add-source"
url = "https://dl.bintray.com/sbt/debian"
path = "/etc/apt/sources.list.d/sbt.list"

[[step]]
action = "install"
packages = ["sbt", "sbt"]

[[step]]
action = "set-user"
name = "runner"

[[step]]
action = "set-user"
name = "runner"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        let warnings = validate_recipe(&recipe).unwrap();
        assert!(warnings.iter().any(|w| w.contains("without a refresh-index")));
        assert!(warnings.iter().any(|w| w.contains("more than once")));
        assert!(warnings.iter().any(|w| w.contains("never followed by refresh-index")));
        assert!(warnings.iter().any(|w| w.contains("No clean-cache")));
        assert!(warnings.iter().any(|w| w.contains("already active")));
    }

    #[test]
    fn test_validate_source_then_key_without_refresh() {
        let content = with_steps(
            r#"
[[step]]
action = "set-user"
name = "root"

[[step]]
action = "add-source"
url = "https://dl.bintray.com/sbt/debian"
path = "/etc/apt/sources.list.d/sbt.list"

[[step]]
action = "import-key"
keyserver = "https://keyserver.ubuntu.com"
fingerprint = "2EE0EA64E40A89B84B2DF73499E82A75642AC823"

[[step]]
action = "set-user"
name = "runner"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        let warnings = validate_recipe(&recipe).unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| w == "Source added at step 1 is never followed by refresh-index")
        );
    }

    #[test]
    fn test_validate_key_alone_needs_no_refresh() {
        let content = with_steps(
            r#"
[[step]]
action = "set-user"
name = "root"

[[step]]
action = "import-key"
keyserver = "https://keyserver.ubuntu.com"
fingerprint = "2EE0EA64E40A89B84B2DF73499E82A75642AC823"

[[step]]
action = "set-user"
name = "runner"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        let warnings = validate_recipe(&recipe).unwrap();
        assert!(!warnings.iter().any(|w| w.contains("never followed by refresh-index")));
    }

    #[test]
    fn test_validate_set_env_name() {
        let content = with_steps(
            r#"
[[step]]
action = "set-env"
name = "1BAD"
value = "x"

[[step]]
action = "set-user"
name = "nobody"
"#,
        );
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_is_env_name() {
        assert!(is_env_name("PACKAGES"));
        assert!(is_env_name("_x1"));
        assert!(!is_env_name(""));
        assert!(!is_env_name("A-B"));
    }
}
