// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use provisioner::{Recipe, SimulatedEnvironment, parse_recipe};
use std::path::PathBuf;

pub const SBT_SOURCE: &str = "https://dl.bintray.com/sbt/debian";
pub const SBT_KEY: &str = "2EE0EA64E40A89B84B2DF73499E82A75642AC823";
pub const KEYSERVER: &str = "https://keyserver.ubuntu.com";

/// The JDK toolchain recipe with a configurable package list
pub fn java_recipe(packages: &[&str]) -> Recipe {
    let packages = packages
        .iter()
        .map(|p| format!("\"{}\"", p))
        .collect::<Vec<_>>()
        .join(", ");

    parse_recipe(&format!(
        r#"
[image]
name = "runner-java"
base = "samber/github-actions-runner:latest"

[[step]]
action = "set-user"
name = "root"

[[step]]
action = "add-source"
url = "{SBT_SOURCE}"
path = "/etc/apt/sources.list.d/sbt.list"

[[step]]
action = "import-key"
keyserver = "{KEYSERVER}"
fingerprint = "{SBT_KEY}"

[[step]]
action = "refresh-index"

[[step]]
action = "install"
packages = [{packages}]

[[step]]
action = "clean-cache"

[[step]]
action = "set-user"
name = "runner"
"#
    ))
    .unwrap()
}

/// Runner image whose stock sources carry the JDK tools and whose sbt
/// source is signed by the sbt key
pub fn runner_image() -> SimulatedEnvironment {
    SimulatedEnvironment::new()
        .with_codename("bionic")
        .with_base_packages(&["default-jdk", "maven", "gradle", "curl"])
        .with_source(SBT_SOURCE, Some(SBT_KEY), &["sbt"])
}

/// Path of a bundled recipe under `recipes/`
pub fn bundled_recipe(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("recipes")
        .join(name)
}
