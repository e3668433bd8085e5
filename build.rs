// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: recipe file
fn recipe_arg() -> Arg {
    Arg::new("recipe")
        .required(true)
        .value_name("RECIPE")
        .help("Path to the recipe file")
}

fn build_cli() -> Command {
    Command::new("provision")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Provisioner Contributors")
        .about("Apply declarative package-manager recipes to a base image")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging (overridden by RUST_LOG)"),
        )
        .subcommand(
            Command::new("validate")
                .about("Load and validate a recipe, printing any warnings")
                .arg(recipe_arg()),
        )
        .subcommand(
            Command::new("plan")
                .about("Show the ordered steps, their effective user and the commands they run")
                .arg(recipe_arg()),
        )
        .subcommand(
            Command::new("apply")
                .about("Apply a recipe to the target")
                .arg(recipe_arg())
                .arg(
                    Arg::new("root")
                        .short('r')
                        .long("root")
                        .default_value("/")
                        .help("Root of the target filesystem"),
                )
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Apply to a simulated image instead of the target"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the run report as JSON"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("Do not show progress bars"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .default_value("30")
                        .help("Timeout for key and file downloads, in seconds"),
                )
                .arg(
                    Arg::new("retries")
                        .long("retries")
                        .default_value("3")
                        .help("Attempts per download"),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Render a recipe as an equivalent Dockerfile")
                .arg(recipe_arg())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Write to a file instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("provision.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
