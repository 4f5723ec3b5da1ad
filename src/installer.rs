// src/installer.rs

//! pip installer collaborator
//!
//! Resolves and downloads a Python package into a staging prefix: a scoped
//! virtualenv supplies a pip, which installs with `--user` and
//! `PYTHONUSERBASE` pointed at the staging tree. Console-script shebangs
//! are rewritten afterwards so the installed commands run against the
//! staged site-packages instead of the build venv. A non-zero installer
//! exit is a fatal precondition failure for the whole run.

use crate::error::{Error, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// How to drive the Python side of the staging install.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Host python used to create the build venv
    pub python_bin: PathBuf,
    /// Interpreter name written into installed command shebangs
    pub python_name: String,
    /// Pass `--compile`/`--no-compile` through to pip
    pub compile: bool,
    /// Install prefix inside the staging tree, conventionally `usr`
    pub prefix: String,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            python_bin: "python3".into(),
            python_name: "python3".into(),
            compile: false,
            prefix: "usr".into(),
        }
    }
}

/// Install `pip_args` (package requirements plus any pip flags after `--`)
/// into `dest/<prefix>` and return the staged site-packages path.
pub fn install(opts: &InstallOptions, dest: &Path, pip_args: &[String]) -> Result<PathBuf> {
    if pip_args.is_empty() {
        return Err(Error::Collection(
            "no packages given to the installer".to_string(),
        ));
    }

    // The venv only exists to supply a pip; it is released with the tempdir.
    let venv = tempfile::Builder::new()
        .prefix("pippack-venv-")
        .tempdir()
        .map_err(|e| Error::Collection(format!("create venv dir: {}", e)))?;

    debug!("Creating build venv in {}", venv.path().display());
    run_installer(
        Command::new(&opts.python_bin)
            .arg("-m")
            .arg("venv")
            .arg("--system-site-packages")
            .arg(venv.path()),
        "venv creation",
    )?;

    let pip = venv.path().join("bin/pip");
    let user_base = dest.join(&opts.prefix);

    let mut cmd = Command::new(&pip);
    cmd.arg("install")
        .arg("--user")
        .arg("--disable-pip-version-check")
        .arg(if opts.compile { "--compile" } else { "--no-compile" })
        .args(pip_args)
        .env("PYTHONUSERBASE", &user_base);

    info!("Installing {:?} into {}", pip_args, user_base.display());
    run_installer(&mut cmd, "pip install")?;

    let site_packages = find_site_packages(&user_base)?;
    fix_console_scripts(&user_base.join("bin"), &site_packages, &opts.python_name)?;

    Ok(site_packages)
}

/// Run one installer step, mapping any failure to a fatal collection error
/// with the tool's output attached.
fn run_installer(cmd: &mut Command, what: &str) -> Result<()> {
    debug!("Running {:?}", cmd);

    let output = cmd
        .output()
        .map_err(|e| Error::Collection(format!("{} failed to start: {}", what, e)))?;

    if !output.status.success() {
        return Err(Error::Collection(format!(
            "{} exited {:?}: {}",
            what,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

/// Locate `lib/pythonX.Y/site-packages` under the staged prefix without
/// assuming the host interpreter version.
fn find_site_packages(user_base: &Path) -> Result<PathBuf> {
    let lib = user_base.join("lib");
    let entries = fs::read_dir(&lib)
        .map_err(|e| Error::Collection(format!("installer produced no {}: {}", lib.display(), e)))?;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("python") {
            let candidate = entry.path().join("site-packages");
            if candidate.is_dir() {
                return Ok(candidate);
            }
        }
    }

    Err(Error::Collection(format!(
        "no site-packages directory under {}",
        lib.display()
    )))
}

/// Rewrite the shebang of every executable console script in `bin_dir` to
/// use the destination interpreter, and insert the staged site-packages
/// onto `sys.path` so the scripts import the packaged library.
fn fix_console_scripts(bin_dir: &Path, site_packages: &Path, python_name: &str) -> Result<()> {
    let entries = match fs::read_dir(bin_dir) {
        Ok(entries) => entries,
        // A library-only package installs no commands.
        Err(_) => return Ok(()),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = path.metadata() else { continue };
        if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
            continue;
        }
        fix_console_script(&path, site_packages, python_name)?;
    }

    Ok(())
}

fn fix_console_script(script: &Path, site_packages: &Path, python_name: &str) -> Result<()> {
    // Binary entry points (compiled launchers) are left alone.
    let Ok(text) = fs::read_to_string(script) else {
        return Ok(());
    };
    if !text.starts_with("#!/") {
        debug!("Skipping {} (no shebang)", script.display());
        return Ok(());
    }

    let rel = relative_from_file(script, site_packages);
    let path_insert = format!(
        "sys.path.insert(0, os.path.abspath(os.path.join(__file__, {:?})))",
        rel
    );

    let mut fixed = String::new();
    for (i, line) in text.lines().enumerate() {
        if i == 0 {
            fixed.push_str(&format!("#! /usr/bin/env {}\n", python_name));
        } else if line == "import sys" {
            fixed.push_str("import os\nimport sys\n");
            fixed.push_str(&path_insert);
            fixed.push('\n');
        } else {
            fixed.push_str(line);
            fixed.push('\n');
        }
    }

    let staged = PathBuf::from(format!("{}.new", script.display()));
    fs::write(&staged, fixed)?;
    fs::set_permissions(&staged, fs::Permissions::from_mode(0o755))?;
    fs::rename(&staged, script)?;

    info!("Rewrote console script {}", script.display());
    Ok(())
}

/// Relative path from a file (counting the file itself as one hop, the way
/// `os.path.join(__file__, "..")` resolves to the file's directory) to a
/// target directory.
fn relative_from_file(file: &Path, target: &Path) -> String {
    let from: Vec<_> = file.components().collect();
    let to: Vec<_> = target.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    // One ".." per remaining component of the file path, including the file
    // name itself.
    for _ in common..from.len() {
        parts.push("..".to_string());
    }
    for component in &to[common..] {
        parts.push(component.as_os_str().to_string_lossy().to_string());
    }

    parts.join("/")
}
