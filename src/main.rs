// src/main.rs

use clap::{Args, Parser, Subcommand};
use pippack::installer::{self, InstallOptions};
use pippack::invoker::BuilderConfig;
use pippack::orchestrator::{Artifact, FormatOutcome, Orchestrator, RunRequest};
use pippack::signer::SignerConfig;
use pippack::spec::{Arch, Dependency, PackageSpec};
use pippack::synth::Format;
use pippack::{Error, collector};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "pippack")]
#[command(author, version, about = "Build native OS packages from pip-installable Python packages", long_about = None)]
struct Cli {
    /// Verbose logging (debug level)
    #[arg(long, global = true)]
    verbose: bool,

    /// Quiet logging (warnings only)
    #[arg(long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every output format.
#[derive(Args)]
struct BuildArgs {
    /// Package name (defaults to the current directory name)
    #[arg(long)]
    name: Option<String>,

    /// Package version
    #[arg(long, default_value = "0.0.1")]
    version: String,

    /// Package release/iteration
    #[arg(long, default_value_t = 1)]
    release: u32,

    /// Target architecture (noarch, x86_64, aarch64)
    #[arg(long, default_value = "noarch")]
    arch: String,

    /// Package maintainer, e.g. "Jane Doe <jane@example.com>"
    #[arg(long)]
    maintainer: Option<String>,

    /// Package description
    #[arg(long)]
    description: Option<String>,

    /// OS-level dependency, e.g. libfoo or "libfoo>=2.0" (repeatable)
    #[arg(long = "depends", default_value = "python3")]
    depends: Vec<String>,

    /// Host python used to create the build venv
    #[arg(long, default_value = "python3")]
    python_bin: PathBuf,

    /// Interpreter name written into installed command shebangs
    #[arg(long, default_value = "python3")]
    python_name: String,

    /// Byte-compile installed modules
    #[arg(long)]
    compile: bool,

    /// Install prefix inside the package
    #[arg(long, default_value = "usr")]
    prefix: String,

    /// Directory the artifact is written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Kill the native builder after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the run result as JSON
    #[arg(long)]
    json: bool,

    /// Arguments passed to pip after `--` (package requirements and flags)
    #[arg(last = true, required = true)]
    pip_args: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a plain gzip'd tarball
    Tar(BuildArgs),
    /// Build an Alpine .apk package
    Apk {
        #[command(flatten)]
        build: BuildArgs,
        /// Private key for abuild-sign
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// Build a Debian .deb package
    Deb(BuildArgs),
    /// Build an RPM package
    Rpm(BuildArgs),
    /// Build an Arch Linux package
    Pacman {
        #[command(flatten)]
        build: BuildArgs,
        /// Private key for the detached GPG signature
        #[arg(long)]
        key: Option<PathBuf>,
    },
}

/// One format's slice of the JSON run report.
#[derive(Serialize)]
struct FormatReport<'a> {
    format: Format,
    artifact: Option<&'a Artifact>,
    error: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let (format, args, key) = match cli.command {
        Some(Commands::Tar(args)) => (Format::Tar, args, None),
        Some(Commands::Apk { build, key }) => (Format::Apk, build, key),
        Some(Commands::Deb(args)) => (Format::Deb, args, None),
        Some(Commands::Rpm(args)) => (Format::Rpm, args, None),
        Some(Commands::Pacman { build, key }) => (Format::Pacman, build, key),
        None => {
            println!("pippack v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'pippack --help' for usage information");
            return;
        }
    };

    std::process::exit(run(format, args, key));
}

/// Stage, collect, build, and report one format; returns the process exit
/// code (0 on success, the error class code otherwise).
fn run(format: Format, args: BuildArgs, key: Option<PathBuf>) -> i32 {
    let outcomes = match run_pipeline(format, &args, key) {
        Ok(outcomes) => outcomes,
        Err(e) => {
            eprintln!("error: {}", e);
            return e.exit_code();
        }
    };

    if args.json {
        let report: Vec<FormatReport> = outcomes
            .iter()
            .map(|o| FormatReport {
                format: o.format,
                artifact: o.artifact.as_ref(),
                error: o.error.as_ref().map(|e| e.to_string()),
            })
            .collect();
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("error: failed to render report: {}", e),
        }
    } else {
        for outcome in &outcomes {
            if let Some(artifact) = &outcome.artifact {
                println!(
                    "{}: {} ({} bytes{})",
                    outcome.format,
                    artifact.path.display(),
                    artifact.size_bytes,
                    if artifact.signed { ", signed" } else { "" }
                );
            }
            if let Some(error) = &outcome.error {
                eprintln!("{}: {}", outcome.format, error);
            }
        }
    }

    outcomes
        .iter()
        .filter_map(|o| o.error.as_ref())
        .map(Error::exit_code)
        .next()
        .unwrap_or(0)
}

fn run_pipeline(
    format: Format,
    args: &BuildArgs,
    key: Option<PathBuf>,
) -> pippack::Result<Vec<FormatOutcome>> {
    let name = match &args.name {
        Some(name) => name.clone(),
        None => default_name()?,
    };

    // Stage the pip install into a scoped directory; released after the
    // artifacts are built.
    let staging = tempfile::Builder::new().prefix("pippack-stage-").tempdir()?;

    let install_opts = InstallOptions {
        python_bin: args.python_bin.clone(),
        python_name: args.python_name.clone(),
        compile: args.compile,
        prefix: args.prefix.clone(),
    };
    let site_packages = installer::install(&install_opts, staging.path(), &args.pip_args)?;
    info!(
        "Staged install complete, PYTHONPATH=/{}",
        site_packages
            .strip_prefix(staging.path())
            .unwrap_or(&site_packages)
            .display()
    );

    let files = collector::collect(staging.path())?;

    let spec = PackageSpec::new(
        name,
        args.version.clone(),
        args.release,
        args.arch.parse::<Arch>()?,
        args.maintainer.clone(),
        args.description.clone(),
        args.depends.iter().map(|d| Dependency::parse(d)).collect(),
        files,
    )?;

    let mut request = RunRequest::new(vec![format], &args.output_dir);
    request.timeout = args.timeout.map(Duration::from_secs);
    request.signing_key = key;

    let orchestrator = Orchestrator::new(BuilderConfig::default(), SignerConfig::default());
    Ok(orchestrator.run(&spec, &request))
}

/// The original defaults the package name to the working directory's name.
fn default_name() -> pippack::Result<String> {
    let cwd = std::env::current_dir()?;
    cwd.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::InvalidSpec {
            field: "name",
            value: cwd.display().to_string(),
            reason: "cannot derive a package name from the working directory".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_all_format_subcommands_exist() {
        let cmd = Cli::command();
        let names: Vec<&str> = cmd.get_subcommands().map(|c| c.get_name()).collect();
        for expected in ["tar", "apk", "deb", "rpm", "pacman"] {
            assert!(names.contains(&expected), "{} subcommand missing", expected);
        }
    }

    #[test]
    fn test_pip_args_follow_separator() {
        let cli = Cli::parse_from([
            "pippack", "deb", "--name", "hello", "--version", "1.0", "--", "hello-world==1.0",
        ]);
        match cli.command {
            Some(Commands::Deb(args)) => {
                assert_eq!(args.name.as_deref(), Some("hello"));
                assert_eq!(args.pip_args, vec!["hello-world==1.0"]);
            }
            _ => panic!("expected deb subcommand"),
        }
    }

    #[test]
    fn test_key_flag_is_apk_and_pacman_only() {
        let cli = Cli::parse_from([
            "pippack", "apk", "--key", "/tmp/k.rsa", "--", "hello",
        ]);
        match cli.command {
            Some(Commands::Apk { key, .. }) => {
                assert_eq!(key, Some(PathBuf::from("/tmp/k.rsa")));
            }
            _ => panic!("expected apk subcommand"),
        }

        assert!(
            Cli::try_parse_from(["pippack", "deb", "--key", "/tmp/k.rsa", "--", "hello"])
                .is_err(),
            "deb must not accept --key"
        );
    }
}
