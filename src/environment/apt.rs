// src/environment/apt.rs

//! apt/dpkg output interpretation and target file parsing

use crate::error::Error;

/// Map a failed apt invocation to the error kind it represents
///
/// apt reports everything through exit code 100, so the kind is recovered
/// from the stderr text.
pub fn classify_apt_failure(phase: &str, code: Option<i32>, stderr: &str) -> Error {
    let mut unresolved = Vec::new();
    for line in stderr.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("E: Unable to locate package ") {
            unresolved.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("E: Package '") {
            if let Some((name, tail)) = rest.split_once('\'') {
                if tail.contains("has no installation candidate") {
                    unresolved.push(name.to_string());
                }
            }
        }
    }
    if !unresolved.is_empty() {
        return Error::ResolutionError(unresolved);
    }

    let first_matching = |needles: &[&str]| {
        stderr
            .lines()
            .find(|l| needles.iter().any(|n| l.contains(n)))
            .map(|l| l.trim().to_string())
    };

    if let Some(line) = first_matching(&["NO_PUBKEY", "is not signed", "signatures couldn't be verified"]) {
        return Error::TrustError(line);
    }

    if let Some(line) = first_matching(&[
        "Could not resolve",
        "Temporary failure resolving",
        "Failed to fetch",
        "Connection timed out",
        "Could not connect",
    ]) {
        return Error::NetworkError(line);
    }

    let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
    let tail: Vec<&str> = tail.into_iter().rev().collect();
    Error::CommandFailed(format!(
        "{} exited with code {}\n{}",
        phase,
        code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
        tail.join("\n")
    ))
}

/// Extract the release codename from `/etc/os-release` content
pub fn parse_os_release_codename(content: &str) -> Option<String> {
    let value = |key: &str| {
        content.lines().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|v| v.trim().trim_matches('"').trim_matches('\'').to_string())
                .filter(|v| !v.is_empty())
        })
    };

    value("VERSION_CODENAME").or_else(|| value("UBUNTU_CODENAME"))
}

/// Check `/etc/passwd` content for an account name
pub fn passwd_has_user(content: &str, name: &str) -> bool {
    content
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .filter_map(|l| l.split(':').next())
        .any(|user| user == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unresolvable() {
        let stderr = "Reading package lists...\n\
                      E: Unable to locate package sbt\n\
                      E: Package 'gradle' has no installation candidate\n";
        match classify_apt_failure("install", Some(100), stderr) {
            Error::ResolutionError(pkgs) => assert_eq!(pkgs, vec!["sbt", "gradle"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_classify_trust() {
        let stderr = "W: GPG error: https://dl.bintray.com/sbt/debian  Release: \
                      The following signatures couldn't be verified because the public key is not available: NO_PUBKEY 99E82A75642AC823\n\
                      E: The repository 'https://dl.bintray.com/sbt/debian  Release' is not signed.\n";
        assert!(matches!(
            classify_apt_failure("refresh-index", Some(100), stderr),
            Error::TrustError(_)
        ));
    }

    #[test]
    fn test_classify_network() {
        let stderr = "Err:1 http://archive.ubuntu.com/ubuntu bionic InRelease\n  \
                      Temporary failure resolving 'archive.ubuntu.com'\n";
        assert!(matches!(
            classify_apt_failure("refresh-index", Some(100), stderr),
            Error::NetworkError(_)
        ));
    }

    #[test]
    fn test_classify_other() {
        let err = classify_apt_failure("clean-cache", Some(1), "E: Could not open lock file");
        assert!(matches!(err, Error::CommandFailed(ref m) if m.contains("code 1")));
    }

    #[test]
    fn test_parse_os_release() {
        let content = "NAME=\"Ubuntu\"\nVERSION_ID=\"18.04\"\nVERSION_CODENAME=bionic\nUBUNTU_CODENAME=bionic\n";
        assert_eq!(parse_os_release_codename(content).as_deref(), Some("bionic"));

        let content = "NAME=\"Ubuntu\"\nUBUNTU_CODENAME=\"focal\"\n";
        assert_eq!(parse_os_release_codename(content).as_deref(), Some("focal"));

        assert_eq!(parse_os_release_codename("NAME=Alpine\n"), None);
    }

    #[test]
    fn test_passwd_has_user() {
        let passwd = "root:x:0:0:root:/root:/bin/bash\nrunner:x:1001:121::/home/runner:/bin/bash\n";
        assert!(passwd_has_user(passwd, "root"));
        assert!(passwd_has_user(passwd, "runner"));
        assert!(!passwd_has_user(passwd, "run"));
    }
}
