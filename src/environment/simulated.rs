// src/environment/simulated.rs

//! In-memory target used for dry runs and tests
//!
//! Models just enough of a Debian-style image to give the executor the same
//! success and failure behavior as the real thing: source list files, a set
//! of trusted keys, a package index rebuilt by `refresh-index`, installed
//! packages and an operation journal.

use super::{Environment, InstallOutcome, StepContext};
use crate::error::{Error, Result};
use crate::hash::{SHA256_PREFIX, parse_checksum, sha256_reader};
use crate::recipe::WriteMode;
use crate::repository::normalize_fingerprint;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use url::Url;

/// A remote package source known to the simulation
#[derive(Debug, Clone)]
struct RemoteSource {
    signed_by: Option<String>,
    packages: BTreeSet<String>,
}

/// Simulated image filesystem and package manager
#[derive(Debug, Clone)]
pub struct SimulatedEnvironment {
    codename: String,
    users: BTreeSet<String>,
    base_packages: BTreeSet<String>,
    remote_sources: BTreeMap<String, RemoteSource>,
    remote_files: BTreeMap<String, String>,
    unreachable: BTreeSet<String>,
    withheld_keys: BTreeSet<String>,
    failing_commands: BTreeSet<String>,
    permissive: bool,

    files: BTreeMap<String, String>,
    symlinks: BTreeMap<String, String>,
    keys: BTreeSet<String>,
    index: BTreeSet<String>,
    installed: BTreeSet<String>,
    journal: Vec<String>,
    commands: Vec<(String, String)>,
}

impl Default for SimulatedEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip a trailing slash so `https://host/php/` and `https://host/php` match
fn source_key(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

impl SimulatedEnvironment {
    /// Empty image with the `root` and `runner` accounts
    pub fn new() -> Self {
        Self {
            codename: "bionic".to_string(),
            users: ["root", "runner"].iter().map(|s| s.to_string()).collect(),
            base_packages: BTreeSet::new(),
            remote_sources: BTreeMap::new(),
            remote_files: BTreeMap::new(),
            unreachable: BTreeSet::new(),
            withheld_keys: BTreeSet::new(),
            failing_commands: BTreeSet::new(),
            permissive: false,
            files: BTreeMap::new(),
            symlinks: BTreeMap::new(),
            keys: BTreeSet::new(),
            index: BTreeSet::new(),
            installed: BTreeSet::new(),
            journal: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Image that accepts any user, source, key, file and package
    ///
    /// Used for `--dry-run`, where the real image is not available.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::new()
        }
    }

    pub fn with_user(mut self, name: &str) -> Self {
        self.users.insert(name.to_string());
        self
    }

    pub fn with_codename(mut self, codename: &str) -> Self {
        self.codename = codename.to_string();
        self
    }

    /// Packages served by the image's preconfigured sources
    pub fn with_base_packages(mut self, packages: &[&str]) -> Self {
        self.base_packages
            .extend(packages.iter().map(|s| s.to_string()));
        self
    }

    /// A remote source serving `packages`, optionally signed by a key
    pub fn with_source(mut self, url: &str, signed_by: Option<&str>, packages: &[&str]) -> Self {
        self.remote_sources.insert(
            source_key(url),
            RemoteSource {
                signed_by: signed_by.map(|fp| normalize_fingerprint(fp).unwrap_or_else(|_| fp.to_string())),
                packages: packages.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// A remote file available for `download`
    pub fn with_remote_file(mut self, url: &str, content: &str) -> Self {
        self.remote_files.insert(url.to_string(), content.to_string());
        self
    }

    /// Make every URL on `host` fail with a network error
    pub fn with_unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_ascii_lowercase());
        self
    }

    /// Key servers answer "not found" for this fingerprint
    pub fn without_key(mut self, fingerprint: &str) -> Self {
        self.withheld_keys
            .insert(normalize_fingerprint(fingerprint).unwrap_or_else(|_| fingerprint.to_string()));
        self
    }

    /// `run` steps with exactly this command exit non-zero
    pub fn with_failing_command(mut self, command: &str) -> Self {
        self.failing_commands.insert(command.to_string());
        self
    }

    /// Packages already present in the base image
    pub fn with_installed(mut self, packages: &[&str]) -> Self {
        self.installed.extend(packages.iter().map(|s| s.to_string()));
        self
    }

    pub fn installed(&self) -> &BTreeSet<String> {
        &self.installed
    }

    /// Operations applied so far, in order
    pub fn journal(&self) -> &[String] {
        &self.journal
    }

    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn symlink_target(&self, link: &str) -> Option<&str> {
        self.symlinks.get(link).map(String::as_str)
    }

    /// `(user, command)` pairs of the `run` steps applied
    pub fn commands_run(&self) -> &[(String, String)] {
        &self.commands
    }

    fn check_reachable(&self, url: &str) -> Result<()> {
        match host_of(url) {
            Some(host) if self.unreachable.contains(&host) => Err(Error::NetworkError(format!(
                "Could not resolve '{}'",
                host
            ))),
            Some(_) => Ok(()),
            None => Err(Error::NetworkError(format!("Invalid URL '{}'", url))),
        }
    }

    /// Source URLs declared in every list file
    fn declared_sources(&self) -> Vec<String> {
        self.files
            .values()
            .flat_map(|content| content.lines())
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                match parts.next() {
                    Some("deb") => parts.next().map(|s| s.to_string()),
                    _ => None,
                }
            })
            .collect()
    }
}

impl Environment for SimulatedEnvironment {
    fn describe(&self) -> String {
        if self.permissive {
            format!("simulated image ({}, permissive)", self.codename)
        } else {
            format!("simulated image ({})", self.codename)
        }
    }

    fn codename(&self) -> Result<String> {
        Ok(self.codename.clone())
    }

    fn has_user(&self, name: &str) -> Result<bool> {
        Ok(self.permissive || self.users.contains(name))
    }

    fn add_source(&mut self, path: &str, line: &str, mode: WriteMode) -> Result<bool> {
        self.journal.push(format!("add-source {}", path));
        let entry = self.files.entry(path.to_string()).or_default();
        match mode {
            WriteMode::Append => {
                if entry.lines().any(|l| l.trim() == line) {
                    return Ok(false);
                }
                entry.push_str(line);
                entry.push('\n');
                Ok(true)
            }
            WriteMode::Replace => {
                let new = format!("{}\n", line);
                let changed = *entry != new;
                *entry = new;
                Ok(changed)
            }
        }
    }

    fn import_key(&mut self, keyserver: &str, fingerprint: &str) -> Result<bool> {
        self.journal.push(format!("import-key {}", fingerprint));
        let fingerprint = normalize_fingerprint(fingerprint)?;
        self.check_reachable(keyserver)?;

        if self.withheld_keys.contains(&fingerprint) {
            return Err(Error::TrustError(format!(
                "Key {} not found on {}",
                fingerprint, keyserver
            )));
        }
        Ok(self.keys.insert(fingerprint))
    }

    fn refresh_index(&mut self) -> Result<()> {
        self.journal.push("refresh-index".to_string());
        let mut index = self.base_packages.clone();

        for url in self.declared_sources() {
            self.check_reachable(&url)?;
            match self.remote_sources.get(&source_key(&url)) {
                Some(source) => {
                    if let Some(fp) = &source.signed_by {
                        if !self.keys.contains(fp) {
                            return Err(Error::TrustError(format!(
                                "The repository '{}' is not signed: NO_PUBKEY {}",
                                url, fp
                            )));
                        }
                    }
                    index.extend(source.packages.iter().cloned());
                }
                None if self.permissive => {}
                None => {
                    return Err(Error::NetworkError(format!(
                        "Failed to fetch {}: 404 Not Found",
                        url
                    )));
                }
            }
        }

        debug!("Simulated index holds {} packages", index.len());
        self.index = index;
        Ok(())
    }

    fn install_packages(&mut self, packages: &[String]) -> Result<InstallOutcome> {
        self.journal.push(format!("install {}", packages.join(" ")));

        let unresolved: Vec<String> = packages
            .iter()
            .filter(|p| !self.permissive && !self.installed.contains(*p) && !self.index.contains(*p))
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            return Err(Error::ResolutionError(unresolved));
        }

        let mut outcome = InstallOutcome::default();
        for package in packages {
            if self.installed.insert(package.clone()) {
                outcome.newly_installed.push(package.clone());
            } else {
                outcome.already_installed.push(package.clone());
            }
        }
        Ok(outcome)
    }

    fn clean_cache(&mut self) -> Result<()> {
        self.journal.push("clean-cache".to_string());
        self.index.clear();
        Ok(())
    }

    fn download(&mut self, url: &str, path: &str, checksum: Option<&str>) -> Result<()> {
        self.journal.push(format!("download {}", url));
        self.check_reachable(url)?;

        let content = match self.remote_files.get(url) {
            Some(content) => content.clone(),
            None if self.permissive => String::new(),
            None => {
                return Err(Error::NetworkError(format!("HTTP 404 Not Found from {}", url)));
            }
        };

        if let Some(expected) = checksum {
            let digest = parse_checksum(expected)?;
            if !self.permissive {
                let actual = sha256_reader(content.as_bytes())?;
                if !actual.eq_ignore_ascii_case(digest) {
                    return Err(Error::ChecksumMismatch {
                        path: path.to_string(),
                        expected: expected.to_string(),
                        actual: format!("{}{}", SHA256_PREFIX, actual),
                    });
                }
            }
        }

        self.files.insert(path.to_string(), content);
        Ok(())
    }

    fn run(&mut self, ctx: &StepContext, command: &str) -> Result<()> {
        self.journal.push(format!("run {}", command));
        if self.failing_commands.contains(command) {
            return Err(Error::CommandFailed(format!(
                "'{}' exited with code Some(1)",
                command
            )));
        }
        self.commands.push((ctx.user.clone(), command.to_string()));
        Ok(())
    }

    fn symlink(&mut self, target: &str, link: &str) -> Result<bool> {
        self.journal.push(format!("symlink {}", link));
        let previous = self.symlinks.insert(link.to_string(), target.to_string());
        Ok(previous.as_deref() != Some(target))
    }

    fn installed_packages(&self, packages: &[String]) -> Result<Vec<String>> {
        Ok(packages
            .iter()
            .filter(|p| self.installed.contains(*p))
            .cloned()
            .collect())
    }
}
