// src/invoker.rs

//! Native builder invocation
//!
//! Runs the format's packaging tool against a staged build-root inside an
//! isolated temporary workspace. The workspace is owned by one invocation
//! and released on every exit path — success, non-zero exit, deadline kill,
//! or an error before the child ever started. Builder output (stdout and
//! stderr combined) is captured for diagnostics; non-zero exits are never
//! retried, native builders are assumed deterministic for a given input.

use crate::archive;
use crate::error::{Error, Result};
use crate::spec::PackageSpec;
use crate::synth::{BuildRoot, Format};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Lines of builder output kept when reporting a failure.
const OUTPUT_TAIL_LINES: usize = 20;

/// Poll interval while waiting on a child with a deadline.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Paths of the native builder binaries, passed in explicitly so parallel
/// pipelines never share a mutable lookup table (and so tests can substitute
/// stub tools).
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub fakeroot: PathBuf,
    pub dpkg_deb: PathBuf,
    pub rpmbuild: PathBuf,
    pub abuild: PathBuf,
    pub makepkg: PathBuf,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            fakeroot: "fakeroot".into(),
            dpkg_deb: "dpkg-deb".into(),
            rpmbuild: "rpmbuild".into(),
            abuild: "abuild".into(),
            makepkg: "makepkg".into(),
        }
    }
}

impl BuilderConfig {
    /// The tools a format needs on the host. The tar artifact is written
    /// in-process and needs none.
    fn tools_for(&self, format: Format) -> Vec<&Path> {
        match format {
            Format::Tar => vec![],
            Format::Apk => vec![self.abuild.as_path()],
            Format::Deb => vec![self.fakeroot.as_path(), self.dpkg_deb.as_path()],
            Format::Rpm => vec![self.rpmbuild.as_path()],
            Format::Pacman => vec![self.makepkg.as_path()],
        }
    }

    /// Check that the builder binaries for `format` resolve, before any
    /// staging work happens. Prevents a cryptic failure deep inside a
    /// half-finished pipeline.
    pub fn preflight(&self, format: Format) -> Result<()> {
        for tool in self.tools_for(format) {
            which::which(tool).map_err(|_| Error::BuildFailed {
                format,
                code: None,
                output: format!("builder tool {} not found in PATH", tool.display()),
            })?;
        }
        Ok(())
    }
}

/// Executes native builders against staged build-roots.
///
/// Invocations for different formats share no mutable state and may run in
/// parallel; invocations for the same format are serialized on a per-format
/// lock so two builders never race over the same native tool's working
/// conventions.
pub struct BuildInvoker {
    config: BuilderConfig,
    timeout: Option<Duration>,
    locks: [Mutex<()>; 5],
}

impl BuildInvoker {
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            timeout: None,
            locks: Default::default(),
        }
    }

    /// Deadline for each native builder run; on expiry the child is killed
    /// and the invocation fails, workspace cleanup still runs.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the native builder for the build-root's format and place the
    /// resulting artifact in `out_dir`. Returns the artifact path and the
    /// builder's combined output.
    pub fn invoke(
        &self,
        build_root: &BuildRoot,
        spec: &PackageSpec,
        out_dir: &Path,
    ) -> Result<(PathBuf, String)> {
        let format = build_root.format();
        let _serialized = self.locks[format.index()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let workspace = tempfile::Builder::new()
            .prefix(&format!("pippack-work-{}-", format))
            .tempdir()?;

        fs::create_dir_all(out_dir)?;

        let (produced, output) = match format {
            Format::Tar => self.build_tar(spec, &workspace)?,
            Format::Deb => self.build_deb(build_root, &workspace)?,
            Format::Rpm => self.build_rpm(build_root, spec, &workspace)?,
            Format::Apk => self.build_apk(build_root, spec, &workspace)?,
            Format::Pacman => self.build_pacman(build_root, &workspace)?,
        };

        let artifact = out_dir.join(produced.file_name().unwrap_or_default());
        persist(&produced, &artifact)?;

        info!("Built {} artifact: {}", format, artifact.display());

        Ok((artifact, output))
    }

    fn build_tar(&self, spec: &PackageSpec, workspace: &TempDir) -> Result<(PathBuf, String)> {
        let artifact = workspace
            .path()
            .join(format!("{}-{}.tar.gz", spec.name, spec.version));
        archive::write_tar_gz(&spec.files, &spec.name, &artifact)?;
        Ok((artifact, String::new()))
    }

    fn build_deb(&self, build_root: &BuildRoot, workspace: &TempDir) -> Result<(PathBuf, String)> {
        let pkg_dir = workspace.path().join("pkg");
        copy_tree(build_root.path(), &pkg_dir)?;

        let mut cmd = Command::new(&self.config.fakeroot);
        cmd.arg("--")
            .arg(&self.config.dpkg_deb)
            .arg("--root-owner-group")
            .arg("--build")
            .arg(&pkg_dir)
            .arg(workspace.path());

        let output = self.run_builder(Format::Deb, cmd, workspace.path())?;
        // dpkg-deb drops the artifact directly in the workspace; depth 1
        // keeps the staged payload copy out of the search.
        let artifact = find_artifact(workspace.path(), 1, Format::Deb, &[".deb"], &output)?;
        Ok((artifact, output))
    }

    fn build_rpm(
        &self,
        build_root: &BuildRoot,
        spec: &PackageSpec,
        workspace: &TempDir,
    ) -> Result<(PathBuf, String)> {
        // rpmbuild scribbles in its topdir, so it gets a copy rather than
        // the pristine build-root.
        let topdir = workspace.path().join("topdir");
        copy_tree(build_root.path(), &topdir)?;

        let mut cmd = Command::new(&self.config.rpmbuild);
        cmd.arg("--define")
            .arg(format!("_topdir {}", topdir.display()))
            .arg("-bb")
            .arg(topdir.join("SPECS").join(format!("{}.spec", spec.name)));

        let output = self.run_builder(Format::Rpm, cmd, workspace.path())?;
        let artifact = find_artifact(&topdir.join("RPMS"), usize::MAX, Format::Rpm, &[".rpm"], &output)?;
        Ok((artifact, output))
    }

    fn build_apk(
        &self,
        build_root: &BuildRoot,
        spec: &PackageSpec,
        workspace: &TempDir,
    ) -> Result<(PathBuf, String)> {
        let build_dir = workspace.path().join("build");
        copy_tree(build_root.path(), &build_dir)?;
        let repo_dir = workspace.path().join("out");
        fs::create_dir_all(&repo_dir)?;

        let mut checksum = Command::new(&self.config.abuild);
        checksum.arg("checksum").current_dir(&build_dir);
        let mut output = self.run_builder(Format::Apk, checksum, workspace.path())?;

        let mut build = Command::new(&self.config.abuild);
        build
            .arg("-rF")
            .arg("-P")
            .arg(&repo_dir)
            .current_dir(&build_dir)
            .env("CARCH", spec.arch.apk_token());
        output.push_str(&self.run_builder(Format::Apk, build, workspace.path())?);

        let artifact = find_artifact(&repo_dir, usize::MAX, Format::Apk, &[".apk"], &output)?;
        Ok((artifact, output))
    }

    fn build_pacman(
        &self,
        build_root: &BuildRoot,
        workspace: &TempDir,
    ) -> Result<(PathBuf, String)> {
        let build_dir = workspace.path().join("build");
        copy_tree(build_root.path(), &build_dir)?;
        let pkg_dest = workspace.path().join("out");
        fs::create_dir_all(&pkg_dest)?;

        let mut cmd = Command::new(&self.config.makepkg);
        cmd.arg("-f")
            .current_dir(&build_dir)
            .env("PKGDEST", &pkg_dest);

        let output = self.run_builder(Format::Pacman, cmd, workspace.path())?;
        let artifact = find_artifact(
            &pkg_dest,
            usize::MAX,
            Format::Pacman,
            &[".pkg.tar.zst", ".pkg.tar.xz", ".pkg.tar.gz"],
            &output,
        )?;
        Ok((artifact, output))
    }

    /// Spawn the builder with combined stdout/stderr captured to a log file
    /// in the workspace, enforcing the deadline if one is set.
    fn run_builder(&self, format: Format, mut cmd: Command, workspace: &Path) -> Result<String> {
        let log_path = workspace.join("builder.log");
        let log = fs::File::create(&log_path)?;

        debug!("Running {:?}", cmd);

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .spawn()
            .map_err(|e| Error::BuildFailed {
                format,
                code: None,
                output: format!("failed to spawn builder: {}", e),
            })?;

        let status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        child.kill()?;
                        child.wait()?;
                        let output = fs::read_to_string(&log_path).unwrap_or_default();
                        return Err(Error::BuildFailed {
                            format,
                            code: None,
                            output: format!(
                                "builder killed after {:?} deadline\n{}",
                                timeout,
                                tail(&output)
                            ),
                        });
                    }
                    std::thread::sleep(WAIT_POLL);
                }
            }
        };

        let output = fs::read_to_string(&log_path).unwrap_or_default();

        if !status.success() {
            return Err(Error::BuildFailed {
                format,
                code: status.code(),
                output: tail(&output),
            });
        }

        Ok(output)
    }
}

/// Last lines of builder output, for error reporting.
fn tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[start..].join("\n")
}

/// Recursively copy a staged tree, preserving permission bits and symlinks.
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| Error::Synthesis(format!("walk {}: {}", src.display(), e)))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Synthesis(format!("copy tree: {}", e)))?;
        let target = dest.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Find the single artifact the builder was expected to leave behind.
fn find_artifact(
    dir: &Path,
    max_depth: usize,
    format: Format,
    suffixes: &[&str],
    output: &str,
) -> Result<PathBuf> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .flatten()
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if suffixes.iter().any(|s| name.ends_with(s)) {
            found.push(entry.path().to_path_buf());
        }
    }

    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(Error::BuildFailed {
            format,
            code: None,
            output: format!("builder exited 0 but produced no artifact\n{}", tail(output)),
        }),
        n => Err(Error::BuildFailed {
            format,
            code: None,
            output: format!("builder produced {} artifacts, expected exactly one", n),
        }),
    }
}

/// Move the built artifact out of the workspace; falls back to copy when
/// the output directory is on another filesystem.
fn persist(src: &Path, dest: &Path) -> Result<()> {
    if fs::rename(src, dest).is_err() {
        fs::copy(src, dest)?;
        fs::remove_file(src)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::Synthesizer;
    use crate::synth::testutil::hello_spec;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write an executable stub tool into `dir`.
    fn stub_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_tar_invocation_builds_named_artifact() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);
        let build_root = Format::Tar.synthesizer().synthesize(&spec).unwrap();

        let out = TempDir::new().unwrap();
        let invoker = BuildInvoker::new(BuilderConfig::default());
        let (artifact, _) = invoker.invoke(&build_root, &spec, out.path()).unwrap();

        assert_eq!(artifact, out.path().join("hello-1.0.tar.gz"));
        assert!(artifact.is_file());
    }

    #[test]
    fn test_tar_build_is_deterministic() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);
        let invoker = BuildInvoker::new(BuilderConfig::default());

        let mut archives = Vec::new();
        for _ in 0..2 {
            let build_root = Format::Tar.synthesizer().synthesize(&spec).unwrap();
            let out = TempDir::new().unwrap();
            let (artifact, _) = invoker.invoke(&build_root, &spec, out.path()).unwrap();
            archives.push(fs::read(&artifact).unwrap());
        }
        assert_eq!(archives[0], archives[1]);
    }

    #[test]
    fn test_deb_stub_builder_end_to_end() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);
        let build_root = Format::Deb.synthesizer().synthesize(&spec).unwrap();

        let tools = TempDir::new().unwrap();
        // fakeroot stub drops the `--` separator and execs the real command.
        let fakeroot = stub_tool(tools.path(), "fakeroot", r#"[ "$1" = "--" ] && shift; exec "$@""#);
        // dpkg-deb stub checks the control file exists and drops an artifact
        // into the output directory (its last argument).
        let dpkg_deb = stub_tool(
            tools.path(),
            "dpkg-deb",
            r#"pkg="$3"; out="$4"; test -f "$pkg/DEBIAN/control" || exit 2
echo "building $pkg"; touch "$out/hello_1.0-1_all.deb""#,
        );

        let config = BuilderConfig {
            fakeroot,
            dpkg_deb,
            ..BuilderConfig::default()
        };

        let out = TempDir::new().unwrap();
        let invoker = BuildInvoker::new(config);
        let (artifact, output) = invoker.invoke(&build_root, &spec, out.path()).unwrap();

        assert_eq!(artifact, out.path().join("hello_1.0-1_all.deb"));
        assert!(output.contains("building"));
    }

    #[test]
    fn test_failing_builder_surfaces_exit_code_and_tail() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);
        let build_root = Format::Deb.synthesizer().synthesize(&spec).unwrap();

        let tools = TempDir::new().unwrap();
        let fakeroot = stub_tool(tools.path(), "fakeroot", r#"[ "$1" = "--" ] && shift; exec "$@""#);
        let dpkg_deb = stub_tool(tools.path(), "dpkg-deb", "echo 'control file syntax error' >&2; exit 2");

        let config = BuilderConfig {
            fakeroot,
            dpkg_deb,
            ..BuilderConfig::default()
        };

        let out = TempDir::new().unwrap();
        let err = BuildInvoker::new(config)
            .invoke(&build_root, &spec, out.path())
            .unwrap_err();

        match err {
            Error::BuildFailed { format, code, output } => {
                assert_eq!(format, Format::Deb);
                assert_eq!(code, Some(2));
                assert!(output.contains("control file syntax error"));
            }
            other => panic!("expected BuildFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_deadline_kills_hung_builder() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);
        let build_root = Format::Deb.synthesizer().synthesize(&spec).unwrap();

        let tools = TempDir::new().unwrap();
        let fakeroot = stub_tool(tools.path(), "fakeroot", r#"[ "$1" = "--" ] && shift; exec "$@""#);
        let dpkg_deb = stub_tool(tools.path(), "dpkg-deb", "sleep 60");

        let config = BuilderConfig {
            fakeroot,
            dpkg_deb,
            ..BuilderConfig::default()
        };

        let out = TempDir::new().unwrap();
        let started = Instant::now();
        let err = BuildInvoker::new(config)
            .with_timeout(Some(Duration::from_millis(200)))
            .invoke(&build_root, &spec, out.path())
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(30));
        match err {
            Error::BuildFailed { code, output, .. } => {
                assert_eq!(code, None);
                assert!(output.contains("deadline"));
            }
            other => panic!("expected BuildFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_with_no_artifact_is_an_error() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);
        let build_root = Format::Deb.synthesizer().synthesize(&spec).unwrap();

        let tools = TempDir::new().unwrap();
        let fakeroot = stub_tool(tools.path(), "fakeroot", r#"[ "$1" = "--" ] && shift; exec "$@""#);
        let dpkg_deb = stub_tool(tools.path(), "dpkg-deb", "exit 0");

        let config = BuilderConfig {
            fakeroot,
            dpkg_deb,
            ..BuilderConfig::default()
        };

        let out = TempDir::new().unwrap();
        let err = BuildInvoker::new(config)
            .invoke(&build_root, &spec, out.path())
            .unwrap_err();
        assert!(matches!(err, Error::BuildFailed { .. }));
    }

    #[test]
    fn test_preflight_reports_missing_tool() {
        let config = BuilderConfig {
            rpmbuild: "definitely-not-a-real-builder-1234".into(),
            ..BuilderConfig::default()
        };
        let err = config.preflight(Format::Rpm).unwrap_err();
        assert!(matches!(err, Error::BuildFailed { format: Format::Rpm, .. }));

        // tar needs no host tools at all
        config.preflight(Format::Tar).unwrap();
    }
}
