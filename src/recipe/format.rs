// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are TOML files that describe an image layer: the base image it
//! is applied to and an ordered list of `[[step]]` tables, each tagged with
//! an `action`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Identity the base image starts in unless the recipe says otherwise
pub const DEFAULT_INITIAL_USER: &str = "runner";

/// A complete provisioning recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Image metadata
    pub image: ImageSection,

    /// Variables for substitution (optional)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Ordered build steps
    #[serde(default, rename = "step")]
    pub steps: Vec<BuildStep>,
}

/// Image metadata section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSection {
    /// Layer name
    pub name: String,

    /// Base image reference the steps are applied onto
    pub base: String,

    /// Identity active when the first step runs
    #[serde(default = "default_initial_user")]
    pub user: String,

    /// Short description
    #[serde(default)]
    pub description: Option<String>,
}

fn default_initial_user() -> String {
    DEFAULT_INITIAL_USER.to_string()
}

/// How a step writes to its target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Add the entry to the end of the file, keeping existing content
    #[default]
    Append,
    /// Overwrite the file with the entry
    Replace,
}

/// A single operation in a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum BuildStep {
    /// Switch the effective identity for all subsequent steps
    SetUser { name: String },

    /// Add a package repository source declaration
    AddSource {
        url: String,
        #[serde(default = "default_suite")]
        suite: String,
        #[serde(default)]
        components: Vec<String>,
        path: String,
        #[serde(default)]
        mode: WriteMode,
    },

    /// Fetch a signing key from a key server and register it
    ImportKey {
        keyserver: String,
        fingerprint: String,
    },

    /// Re-synchronize package metadata with all configured sources
    RefreshIndex,

    /// Install packages; fails if any name is unresolvable
    Install { packages: Vec<String> },

    /// Remove transient package-manager state
    CleanCache,

    /// Fetch a file into the target
    Download {
        url: String,
        path: String,
        #[serde(default)]
        checksum: Option<String>,
    },

    /// Run a shell command as the active identity
    Run { command: String },

    /// Create a symbolic link at `link` pointing to `target`
    Symlink { target: String, link: String },

    /// Define an environment variable for subsequent `run` steps
    SetEnv { name: String, value: String },
}

fn default_suite() -> String {
    "/".to_string()
}

impl BuildStep {
    /// The `action` name of this step as written in recipes
    pub fn kind(&self) -> &'static str {
        match self {
            BuildStep::SetUser { .. } => "set-user",
            BuildStep::AddSource { .. } => "add-source",
            BuildStep::ImportKey { .. } => "import-key",
            BuildStep::RefreshIndex => "refresh-index",
            BuildStep::Install { .. } => "install",
            BuildStep::CleanCache => "clean-cache",
            BuildStep::Download { .. } => "download",
            BuildStep::Run { .. } => "run",
            BuildStep::Symlink { .. } => "symlink",
            BuildStep::SetEnv { .. } => "set-env",
        }
    }

    /// Whether this step mutates system state and therefore needs the
    /// privileged identity to be active
    pub fn requires_privilege(&self) -> bool {
        !matches!(
            self,
            BuildStep::SetUser { .. } | BuildStep::Run { .. } | BuildStep::SetEnv { .. }
        )
    }

    /// All string fields that accept `%(name)s` placeholders
    fn templates(&self) -> Vec<&str> {
        match self {
            BuildStep::SetUser { name } => vec![name.as_str()],
            BuildStep::AddSource {
                url,
                suite,
                components,
                path,
                ..
            } => {
                let mut fields = vec![url.as_str(), suite.as_str(), path.as_str()];
                fields.extend(components.iter().map(|c| c.as_str()));
                fields
            }
            BuildStep::ImportKey {
                keyserver,
                fingerprint,
            } => vec![keyserver.as_str(), fingerprint.as_str()],
            BuildStep::RefreshIndex | BuildStep::CleanCache => Vec::new(),
            BuildStep::Install { packages } => packages.iter().map(|p| p.as_str()).collect(),
            BuildStep::Download { url, path, .. } => vec![url.as_str(), path.as_str()],
            BuildStep::Run { command } => vec![command.as_str()],
            BuildStep::Symlink { target, link } => vec![target.as_str(), link.as_str()],
            BuildStep::SetEnv { value, .. } => vec![value.as_str()],
        }
    }

    /// Placeholder names referenced by this step
    pub fn placeholders(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for template in self.templates() {
            names.extend(placeholders(template)?.into_iter().map(str::to_string));
        }
        Ok(names)
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::SetUser { name } => write!(f, "set-user {}", name),
            BuildStep::AddSource {
                url,
                suite,
                components,
                path,
                ..
            } => write!(
                f,
                "add-source '{}' -> {}",
                source_line(url, suite, components),
                path
            ),
            BuildStep::ImportKey {
                keyserver,
                fingerprint,
            } => write!(f, "import-key {} from {}", fingerprint, keyserver),
            BuildStep::RefreshIndex => write!(f, "refresh-index"),
            BuildStep::Install { packages } => write!(f, "install {}", packages.join(" ")),
            BuildStep::CleanCache => write!(f, "clean-cache"),
            BuildStep::Download { url, path, .. } => write!(f, "download {} -> {}", url, path),
            BuildStep::Run { command } => write!(f, "run {}", command),
            BuildStep::Symlink { target, link } => write!(f, "symlink {} -> {}", link, target),
            BuildStep::SetEnv { name, value } => write!(f, "set-env {}={}", name, value),
        }
    }
}

/// Render a one-line source declaration: `deb <url> <suite> [components...]`
pub fn source_line(url: &str, suite: &str, components: &[String]) -> String {
    let mut line = format!("deb {} {}", url, suite);
    for component in components {
        line.push(' ');
        line.push_str(component);
    }
    line
}

/// Extract `%(name)s` placeholder names from a template
pub fn placeholders(template: &str) -> Result<Vec<&str>> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("%(") {
        let after = &rest[start + 2..];
        let end = after.find(")s").ok_or_else(|| {
            Error::ParseError(format!("Unterminated placeholder in '{}'", template))
        })?;
        names.push(&after[..end]);
        rest = &after[end + 2..];
    }

    Ok(names)
}

impl Recipe {
    /// Names a placeholder may refer to
    pub fn known_variables(&self) -> HashSet<&str> {
        let mut known: HashSet<&str> = ["name", "base", "codename"].into_iter().collect();
        known.extend(self.variables.keys().map(|k| k.as_str()));
        known
    }

    /// Look up a placeholder value
    ///
    /// `name` and `base` come from the image section. `codename` prefers the
    /// `[variables]` entry and falls back to the one reported by the target.
    fn lookup(&self, key: &str, codename: Option<&str>) -> Option<String> {
        match key {
            "name" => Some(self.image.name.clone()),
            "base" => Some(self.image.base.clone()),
            "codename" => self
                .variables
                .get("codename")
                .cloned()
                .or_else(|| codename.map(str::to_string)),
            other => self.variables.get(other).cloned(),
        }
    }

    /// Substitute `%(name)s` placeholders in a string
    pub fn substitute(&self, template: &str, codename: Option<&str>) -> Result<String> {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("%(") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find(")s").ok_or_else(|| {
                Error::ParseError(format!("Unterminated placeholder in '{}'", template))
            })?;
            let key = &after[..end];
            let value = self.lookup(key, codename).ok_or_else(|| {
                Error::ParseError(format!("Unknown variable '%({})s' in '{}'", key, template))
            })?;
            result.push_str(&value);
            rest = &after[end + 2..];
        }

        result.push_str(rest);
        Ok(result)
    }

    /// Produce a copy of a step with every placeholder substituted
    ///
    /// Package entries that expand to several whitespace-separated words are
    /// split into individual packages, and duplicates are dropped keeping
    /// the first occurrence.
    pub fn resolve_step(&self, step: &BuildStep, codename: Option<&str>) -> Result<BuildStep> {
        let sub = |s: &str| self.substitute(s, codename);

        Ok(match step {
            BuildStep::SetUser { name } => BuildStep::SetUser { name: sub(name)? },
            BuildStep::AddSource {
                url,
                suite,
                components,
                path,
                mode,
            } => BuildStep::AddSource {
                url: sub(url)?,
                suite: sub(suite)?,
                components: components.iter().map(|c| sub(c)).collect::<Result<_>>()?,
                path: sub(path)?,
                mode: *mode,
            },
            BuildStep::ImportKey {
                keyserver,
                fingerprint,
            } => BuildStep::ImportKey {
                keyserver: sub(keyserver)?,
                fingerprint: sub(fingerprint)?,
            },
            BuildStep::RefreshIndex => BuildStep::RefreshIndex,
            BuildStep::Install { packages } => {
                let mut seen = HashSet::new();
                let mut expanded = Vec::new();
                for entry in packages {
                    for word in sub(entry)?.split_whitespace() {
                        if seen.insert(word.to_string()) {
                            expanded.push(word.to_string());
                        }
                    }
                }
                BuildStep::Install { packages: expanded }
            }
            BuildStep::CleanCache => BuildStep::CleanCache,
            BuildStep::Download {
                url,
                path,
                checksum,
            } => BuildStep::Download {
                url: sub(url)?,
                path: sub(path)?,
                checksum: checksum.clone(),
            },
            BuildStep::Run { command } => BuildStep::Run {
                command: sub(command)?,
            },
            BuildStep::Symlink { target, link } => BuildStep::Symlink {
                target: sub(target)?,
                link: sub(link)?,
            },
            BuildStep::SetEnv { name, value } => BuildStep::SetEnv {
                name: name.clone(),
                value: sub(value)?,
            },
        })
    }
}
