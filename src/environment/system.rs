// src/environment/system.rs

//! apt/dpkg target on a real root filesystem
//!
//! With a root of `/` commands run directly on the host. Any other root is
//! treated as an unpacked image and commands are run through `chroot`, while
//! file-level operations (source lists, keys, downloads, links) are done by
//! this process against paths under the root.

use super::apt::{classify_apt_failure, parse_os_release_codename, passwd_has_user};
use super::{APT_LISTS_DIR, Environment, InstallOutcome, StepContext, TRUSTED_KEYS_DIR};
use crate::error::{Error, Result};
use crate::recipe::{PRIVILEGED_USER, WriteMode};
use crate::repository::{
    HttpClient, Keyring, lookup_url, normalize_fingerprint, verify_key_material,
    write_source_entry,
};
use nix::unistd::{User, geteuid};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info, warn};

/// Environment backed by apt-get and dpkg
pub struct SystemEnvironment {
    root: PathBuf,
    client: HttpClient,
    invoking_user: String,
}

impl SystemEnvironment {
    /// Open a target rooted at `root`
    ///
    /// Fails if the package tooling needed to apply steps is missing.
    pub fn new(root: impl Into<PathBuf>, client: HttpClient) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::NotFound(format!(
                "Target root {} is not a directory",
                root.display()
            )));
        }

        let invoking_user = User::from_uid(geteuid())
            .map_err(|e| Error::InitError(format!("Failed to look up invoking user: {}", e)))?
            .map(|u| u.name)
            .unwrap_or_else(|| geteuid().to_string());

        let env = Self {
            root,
            client,
            invoking_user,
        };

        if env.is_host_root() {
            which::which("apt-get")
                .map_err(|_| Error::NotFound("apt-get not found in PATH".to_string()))?;
        } else {
            which::which("chroot")
                .map_err(|_| Error::NotFound("chroot not found in PATH".to_string()))?;
            if !env.in_root("/usr/bin/apt-get").exists() {
                return Err(Error::NotFound(format!(
                    "apt-get not found under {}",
                    env.root.display()
                )));
            }
        }

        if env.invoking_user != PRIVILEGED_USER {
            warn!(
                "Running as '{}'; privileged steps need to run as {}",
                env.invoking_user, PRIVILEGED_USER
            );
        }

        debug!("Opened system target at {}", env.root.display());
        Ok(env)
    }

    fn is_host_root(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Map an absolute in-target path onto the host filesystem
    fn in_root(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// Build a command that runs inside the target
    fn command(&self, program: &str) -> Command {
        if self.is_host_root() {
            Command::new(program)
        } else {
            let mut cmd = Command::new("chroot");
            cmd.arg(&self.root).arg(program);
            cmd
        }
    }

    fn require_root(&self, phase: &str) -> Result<()> {
        if self.invoking_user == PRIVILEGED_USER {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "{} needs {} but this process runs as '{}'",
                phase, PRIVILEGED_USER, self.invoking_user
            )))
        }
    }

    /// Run apt-get with the given arguments, classifying failures
    fn apt_get(&self, phase: &str, args: &[&str]) -> Result<Output> {
        debug!("apt-get {}", args.join(" "));
        let output = self
            .command("apt-get")
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .output()
            .map_err(|e| Error::IoError(format!("Failed to run apt-get for {}: {}", phase, e)))?;

        log_output(phase, &output);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_apt_failure(phase, output.status.code(), &stderr));
        }
        Ok(output)
    }
}

fn log_output(phase: &str, output: &Output) {
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!("[{}] {}", phase, line);
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        debug!("[{}:err] {}", phase, line);
    }
}

impl Environment for SystemEnvironment {
    fn describe(&self) -> String {
        format!("system root {} (as {})", self.root.display(), self.invoking_user)
    }

    fn codename(&self) -> Result<String> {
        let path = self.in_root("/etc/os-release");
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))?;
        parse_os_release_codename(&content).ok_or_else(|| {
            Error::NotFound(format!("No release codename in {}", path.display()))
        })
    }

    fn has_user(&self, name: &str) -> Result<bool> {
        let path = self.in_root("/etc/passwd");
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(passwd_has_user(&content, name))
    }

    fn add_source(&mut self, path: &str, line: &str, mode: WriteMode) -> Result<bool> {
        self.require_root("add-source")?;
        write_source_entry(&self.in_root(path), line, mode)
    }

    fn import_key(&mut self, keyserver: &str, fingerprint: &str) -> Result<bool> {
        self.require_root("import-key")?;
        let fingerprint = normalize_fingerprint(fingerprint)?;
        let keyring = Keyring::new(self.in_root(TRUSTED_KEYS_DIR))?;

        if keyring.has_key(&fingerprint) {
            debug!("Key {} already trusted", fingerprint);
            return Ok(false);
        }

        let url = lookup_url(keyserver, &fingerprint)?;
        info!("Fetching key {} from {}", fingerprint, keyserver);
        let data = self.client.download_to_bytes(&url)?;
        let key = verify_key_material(&data, &fingerprint)?;
        keyring.install(&key)
    }

    fn refresh_index(&mut self) -> Result<()> {
        self.require_root("refresh-index")?;
        let output = self.apt_get("refresh-index", &["update"])?;

        // apt-get update exits 0 when a source is unsigned or unreachable and
        // only warns, so check the warnings too.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.lines().any(|l| l.starts_with("W: ") || l.starts_with("E: ")) {
            match classify_apt_failure("refresh-index", output.status.code(), &stderr) {
                err @ (Error::TrustError(_) | Error::NetworkError(_)) => return Err(err),
                _ => {}
            }
        }
        Ok(())
    }

    fn install_packages(&mut self, packages: &[String]) -> Result<InstallOutcome> {
        self.require_root("install")?;
        let already: BTreeSet<String> = self.installed_packages(packages)?.into_iter().collect();
        let missing: Vec<&str> = packages
            .iter()
            .filter(|p| !already.contains(*p))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            let mut args = vec!["install", "-y", "-q"];
            args.extend(missing.iter().copied());
            self.apt_get("install", &args)?;
        }

        Ok(InstallOutcome {
            newly_installed: missing.iter().map(|s| s.to_string()).collect(),
            already_installed: packages
                .iter()
                .filter(|p| already.contains(*p))
                .cloned()
                .collect(),
        })
    }

    fn clean_cache(&mut self) -> Result<()> {
        self.require_root("clean-cache")?;
        self.apt_get("clean-cache", &["clean"])?;

        let lists = self.in_root(APT_LISTS_DIR);
        if lists.is_dir() {
            for entry in fs::read_dir(&lists)? {
                let path = entry?.path();
                if path.is_dir() && !path.is_symlink() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }

    fn download(&mut self, url: &str, path: &str, checksum: Option<&str>) -> Result<()> {
        self.require_root("download")?;
        let dest = self.in_root(path);
        let bytes = self.client.download_file(url, &dest, checksum)?;

        info!("Downloaded {} ({} bytes) to {}", url, bytes, path);
        Ok(())
    }

    fn run(&mut self, ctx: &StepContext, command: &str) -> Result<()> {
        let mut cmd = if ctx.user == self.invoking_user {
            let mut cmd = self.command("sh");
            cmd.arg("-c").arg(command);
            cmd
        } else {
            self.require_root("run as another user")?;
            let mut cmd = self.command("runuser");
            cmd.args(["-u", ctx.user.as_str(), "--", "sh", "-c", command]);
            cmd
        };

        let output = cmd
            .envs(ctx.env.iter())
            .output()
            .map_err(|e| Error::IoError(format!("Failed to run command: {}", e)))?;

        log_output("run", &output);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandFailed(format!(
                "'{}' exited with code {:?}\nstderr: {}",
                command,
                output.status.code(),
                stderr.trim_end()
            )));
        }
        Ok(())
    }

    fn symlink(&mut self, target: &str, link: &str) -> Result<bool> {
        self.require_root("symlink")?;
        let link_path = self.in_root(link);

        if let Ok(existing) = fs::read_link(&link_path) {
            if existing == Path::new(target) {
                return Ok(false);
            }
        }

        if link_path.is_symlink() || link_path.is_file() {
            fs::remove_file(&link_path)?;
        } else if link_path.is_dir() {
            return Err(Error::IoError(format!(
                "Cannot replace directory {} with a link",
                link
            )));
        }

        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent)?;
        }
        std::os::unix::fs::symlink(target, &link_path)?;
        Ok(true)
    }

    fn installed_packages(&self, packages: &[String]) -> Result<Vec<String>> {
        if packages.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = Command::new("dpkg-query");
        if !self.is_host_root() {
            cmd.arg(format!("--admindir={}", self.in_root("/var/lib/dpkg").display()));
        }
        let output = cmd
            .args(["-W", "-f=${Package} ${db:Status-Status}\\n"])
            .args(packages)
            .output()
            .map_err(|e| Error::IoError(format!("Failed to run dpkg-query: {}", e)))?;

        // Exit code 1 only means some names are unknown to dpkg.
        let installed: BTreeSet<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.split_once(' '))
            .filter(|(_, status)| status.trim() == "installed")
            .map(|(name, _)| name.split(':').next().unwrap_or(name).to_string())
            .collect();

        Ok(packages
            .iter()
            .filter(|p| installed.contains(*p))
            .cloned()
            .collect())
    }
}
