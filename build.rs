// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Flags shared by every format subcommand.
fn build_args(cmd: Command) -> Command {
    cmd.arg(Arg::new("name").long("name").help("Package name (defaults to the current directory name)"))
        .arg(
            Arg::new("version")
                .long("version")
                .default_value("0.0.1")
                .help("Package version"),
        )
        .arg(
            Arg::new("release")
                .long("release")
                .default_value("1")
                .help("Package release/iteration"),
        )
        .arg(
            Arg::new("arch")
                .long("arch")
                .default_value("noarch")
                .help("Target architecture (noarch, x86_64, aarch64)"),
        )
        .arg(Arg::new("maintainer").long("maintainer").help("Package maintainer"))
        .arg(Arg::new("description").long("description").help("Package description"))
        .arg(
            Arg::new("depends")
                .long("depends")
                .action(ArgAction::Append)
                .default_value("python3")
                .help("OS-level dependency, repeatable"),
        )
        .arg(
            Arg::new("python_bin")
                .long("python-bin")
                .default_value("python3")
                .help("Host python used to create the build venv"),
        )
        .arg(
            Arg::new("python_name")
                .long("python-name")
                .default_value("python3")
                .help("Interpreter name written into installed command shebangs"),
        )
        .arg(
            Arg::new("compile")
                .long("compile")
                .action(ArgAction::SetTrue)
                .help("Byte-compile installed modules"),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .default_value("usr")
                .help("Install prefix inside the package"),
        )
        .arg(
            Arg::new("output_dir")
                .long("output-dir")
                .default_value(".")
                .help("Directory the artifact is written to"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help("Kill the native builder after this many seconds"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the run result as JSON"),
        )
        .arg(
            Arg::new("pip_args")
                .last(true)
                .required(true)
                .num_args(1..)
                .help("Arguments passed to pip (package requirements and flags)"),
        )
}

fn key_arg(cmd: Command) -> Command {
    cmd.arg(Arg::new("key").long("key").help("Private signing key"))
}

fn build_cli() -> Command {
    Command::new("pippack")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Pippack Contributors")
        .about("Build native OS packages from pip-installable Python packages")
        .subcommand_required(false)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Verbose logging"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Quiet logging"),
        )
        .subcommand(build_args(Command::new("tar").about("Build a plain gzip'd tarball")))
        .subcommand(key_arg(build_args(
            Command::new("apk").about("Build an Alpine .apk package"),
        )))
        .subcommand(build_args(Command::new("deb").about("Build a Debian .deb package")))
        .subcommand(build_args(Command::new("rpm").about("Build an RPM package")))
        .subcommand(key_arg(build_args(
            Command::new("pacman").about("Build an Arch Linux package"),
        )))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("pippack.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
