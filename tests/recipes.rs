// tests/recipes.rs

//! Checks on the recipes bundled under `recipes/`.

mod common;

use common::{SBT_KEY, bundled_recipe, runner_image};
use provisioner::recipe::render_dockerfile;
use provisioner::{BuildStep, Executor, SimulatedEnvironment, load_recipe_file, validate_recipe};

#[test]
fn test_java_recipe_is_clean() {
    let recipe = load_recipe_file(&bundled_recipe("java-runner.toml")).unwrap();
    assert_eq!(recipe.image.name, "runner-java");
    assert_eq!(recipe.steps.len(), 7);
    assert!(validate_recipe(&recipe).unwrap().is_empty());

    assert!(matches!(
        &recipe.steps[2],
        BuildStep::ImportKey { fingerprint, .. } if fingerprint == SBT_KEY
    ));
    assert!(matches!(recipe.steps.last(), Some(BuildStep::SetUser { name }) if name == "runner"));
}

#[test]
fn test_java_recipe_applies() {
    let recipe = load_recipe_file(&bundled_recipe("java-runner.toml")).unwrap();
    let mut env = runner_image();

    let report = Executor::new(&mut env).run(&recipe).unwrap();
    assert_eq!(report.final_user, "runner");
    assert_eq!(report.installed.len(), 4);
}

#[test]
fn test_php_recipe_applies() {
    let recipe = load_recipe_file(&bundled_recipe("php-runner.toml")).unwrap();
    let php_packages = [
        "php7.2-fpm",
        "php7.2-cli",
        "php7.2-common",
        "php7.2-curl",
        "php7.2-gd",
        "php7.2-intl",
        "php7.2-pgsql",
        "php7.2-json",
        "php7.2-redis",
        "php7.2-mbstring",
        "php7.2-bcmath",
        "php-mail-mime",
    ];
    let mut env = SimulatedEnvironment::new()
        .with_codename("bionic")
        .with_remote_file("https://packages.sury.org/php/apt.gpg", "sury key")
        .with_source("https://packages.sury.org/php/", None, &php_packages);

    let report = Executor::new(&mut env).run(&recipe).unwrap();

    assert_eq!(report.installed, php_packages);
    assert_eq!(
        env.file("/etc/apt/sources.list.d/php.list"),
        Some("deb https://packages.sury.org/php/ bionic main\n")
    );
    assert_eq!(env.file("/etc/apt/trusted.gpg.d/php.gpg"), Some("sury key"));
    assert_eq!(
        env.symlink_target("/usr/local/bin/composer"),
        Some("/usr/local/bin/composer.phar")
    );
    assert_eq!(env.commands_run()[0].0, "root");
    assert_eq!(report.final_user, "runner");
}

#[test]
fn test_java_recipe_renders_original_layer() {
    let recipe = load_recipe_file(&bundled_recipe("java-runner.toml")).unwrap();
    let text = render_dockerfile(&recipe).unwrap();

    assert!(text.contains("FROM samber/github-actions-runner:latest"));
    assert!(text.contains("apt-get install -y -q default-jdk maven gradle sbt"));
    assert!(text.contains(&format!("search=0x{}", SBT_KEY)));
    assert!(text.trim_end().ends_with("USER runner"));
}
