// src/orchestrator.rs

//! Pipeline orchestration
//!
//! One pipeline per requested format: synthesize -> build -> sign. The
//! installed tree is collected and the `PackageSpec` validated once, before
//! any per-format work, so every format sees the same input or none does.
//! Pipelines for distinct formats are independent; a failure in one never
//! aborts its siblings, and a multi-format run returns a per-format result
//! set instead of failing the batch.

use crate::error::{Error, Result};
use crate::invoker::{BuildInvoker, BuilderConfig};
use crate::signer::{ArtifactSigner, SignerConfig};
use crate::spec::PackageSpec;
use crate::synth::{Format, Synthesizer};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// The terminal output of one successful pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub format: Format,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub signed: bool,
}

/// What one format's pipeline produced: an artifact, an error, or — when
/// the build succeeded but signing failed — both.
#[derive(Debug)]
pub struct FormatOutcome {
    pub format: Format,
    pub artifact: Option<Artifact>,
    pub error: Option<Error>,
}

impl FormatOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-run options shared by every requested format.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub formats: Vec<Format>,
    pub output_dir: PathBuf,
    /// Fan pipelines out over worker threads; sequential by default since
    /// native builders are heavy, disk-bound subprocesses.
    pub parallel: bool,
    /// Worker-thread cap for parallel mode; `None` uses the pool default.
    pub jobs: Option<usize>,
    /// Deadline for each native builder run.
    pub timeout: Option<Duration>,
    /// Private key for the formats that sign (apk, pacman); ignored by the
    /// rest.
    pub signing_key: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(formats: Vec<Format>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            formats,
            output_dir: output_dir.into(),
            parallel: false,
            jobs: None,
            timeout: None,
            signing_key: None,
        }
    }
}

/// Sequences collection, synthesis, build, and signing, and maps per-format
/// failures into the result set.
pub struct Orchestrator {
    builders: BuilderConfig,
    signer: SignerConfig,
}

impl Orchestrator {
    pub fn new(builders: BuilderConfig, signer: SignerConfig) -> Self {
        Self { builders, signer }
    }

    /// Run one pipeline per requested format against an already-validated
    /// spec. Duplicate format requests collapse to one pipeline each.
    pub fn run(&self, spec: &PackageSpec, request: &RunRequest) -> Vec<FormatOutcome> {
        let mut formats: Vec<Format> = Vec::new();
        for format in &request.formats {
            if !formats.contains(format) {
                formats.push(*format);
            }
        }

        let invoker = BuildInvoker::new(self.builders.clone()).with_timeout(request.timeout);

        if request.parallel {
            let fan_out = || {
                formats
                    .par_iter()
                    .map(|format| self.run_pipeline(spec, *format, request, &invoker))
                    .collect()
            };
            // A scoped pool caps the fan-out; falls back to the global pool
            // if the scoped one cannot be built.
            match rayon::ThreadPoolBuilder::new()
                .num_threads(request.jobs.unwrap_or(0))
                .build()
            {
                Ok(pool) => pool.install(fan_out),
                Err(_) => fan_out(),
            }
        } else {
            formats
                .iter()
                .map(|format| self.run_pipeline(spec, *format, request, &invoker))
                .collect()
        }
    }

    fn run_pipeline(
        &self,
        spec: &PackageSpec,
        format: Format,
        request: &RunRequest,
        invoker: &BuildInvoker,
    ) -> FormatOutcome {
        info!("Starting {} pipeline for {}-{}", format, spec.name, spec.version);

        let artifact = match self.build_artifact(spec, format, request, invoker) {
            Ok(artifact) => artifact,
            Err(error) => {
                warn!("{} pipeline failed: {}", format, error);
                return FormatOutcome {
                    format,
                    artifact: None,
                    error: Some(error),
                };
            }
        };

        // Signing failure is fatal to signing only: the unsigned artifact is
        // preserved and reported alongside the error.
        if let Some(key) = request.signing_key.as_ref().filter(|_| format.supports_signing()) {
            let signer = ArtifactSigner::new(self.signer.clone(), key);
            match signer.sign(&artifact.path, format) {
                Ok(_) => {
                    return FormatOutcome {
                        format,
                        artifact: Some(Artifact {
                            signed: true,
                            ..artifact
                        }),
                        error: None,
                    };
                }
                Err(error) => {
                    warn!("{} signing failed, keeping unsigned artifact: {}", format, error);
                    return FormatOutcome {
                        format,
                        artifact: Some(artifact),
                        error: Some(error),
                    };
                }
            }
        }

        FormatOutcome {
            format,
            artifact: Some(artifact),
            error: None,
        }
    }

    fn build_artifact(
        &self,
        spec: &PackageSpec,
        format: Format,
        request: &RunRequest,
        invoker: &BuildInvoker,
    ) -> Result<Artifact> {
        self.builders.preflight(format)?;

        let synthesizer = format.synthesizer();
        let build_root = synthesizer.synthesize(spec)?;

        let (path, _output) = invoker.invoke(&build_root, spec, &request.output_dir)?;
        let size_bytes = std::fs::metadata(&path)?.len();

        Ok(Artifact {
            format,
            path,
            size_bytes,
            signed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::testutil::hello_spec;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn stub_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn stub_builders(dir: &Path) -> BuilderConfig {
        BuilderConfig {
            fakeroot: stub_tool(dir, "fakeroot", r#"[ "$1" = "--" ] && shift; exec "$@""#),
            dpkg_deb: stub_tool(
                dir,
                "dpkg-deb",
                r#"touch "$4/hello_1.0-1_all.deb""#,
            ),
            rpmbuild: "rpmbuild".into(),
            abuild: "abuild".into(),
            makepkg: "makepkg".into(),
        }
    }

    #[test]
    fn test_multi_format_run_returns_per_format_outcomes() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);

        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(stub_builders(tools.path()), SignerConfig::default());

        let request = RunRequest::new(vec![Format::Tar, Format::Deb], out.path());
        let outcomes = orchestrator.run(&spec, &request);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert_eq!(outcomes[0].format, Format::Tar);
        assert_eq!(outcomes[1].format, Format::Deb);
        assert!(out.path().join("hello-1.0.tar.gz").is_file());
        assert!(out.path().join("hello_1.0-1_all.deb").is_file());
    }

    #[test]
    fn test_one_failing_format_does_not_abort_siblings() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);

        let tools = TempDir::new().unwrap();
        let mut builders = stub_builders(tools.path());
        builders.dpkg_deb = stub_tool(tools.path(), "dpkg-deb", "echo boom >&2; exit 9");

        let out = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(builders, SignerConfig::default());

        let request = RunRequest::new(vec![Format::Deb, Format::Tar], out.path());
        let outcomes = orchestrator.run(&spec, &request);

        assert!(!outcomes[0].is_success());
        assert!(matches!(
            outcomes[0].error,
            Some(Error::BuildFailed { code: Some(9), .. })
        ));
        assert!(outcomes[1].is_success(), "tar must still build");
        assert!(out.path().join("hello-1.0.tar.gz").is_file());
    }

    #[test]
    fn test_parallel_run_produces_same_result_set() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);

        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(stub_builders(tools.path()), SignerConfig::default());

        let mut request = RunRequest::new(vec![Format::Tar, Format::Deb], out.path());
        request.parallel = true;
        request.jobs = Some(2);
        let outcomes = orchestrator.run(&spec, &request);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].format, Format::Tar);
        assert_eq!(outcomes[1].format, Format::Deb);
        assert!(outcomes.iter().all(|o| o.is_success()));
    }

    #[test]
    fn test_duplicate_format_requests_collapse() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);

        let out = TempDir::new().unwrap();
        let orchestrator =
            Orchestrator::new(BuilderConfig::default(), SignerConfig::default());

        let request = RunRequest::new(vec![Format::Tar, Format::Tar], out.path());
        let outcomes = orchestrator.run(&spec, &request);
        assert_eq!(outcomes.len(), 1);
    }

    #[test]
    fn test_signing_failure_preserves_artifact_and_reports_both() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);

        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();

        // tar never signs, so use a pacman-shaped run against a stub
        // makepkg; the signing key path does not exist.
        let mut builders = stub_builders(tools.path());
        builders.makepkg = stub_tool(
            tools.path(),
            "makepkg",
            r#"touch "$PKGDEST/hello-1.0-1-any.pkg.tar.zst""#,
        );

        let orchestrator = Orchestrator::new(builders, SignerConfig::default());
        let mut request = RunRequest::new(vec![Format::Pacman], out.path());
        request.signing_key = Some(tools.path().join("no-such-key.gpg"));

        let outcomes = orchestrator.run(&spec, &request);
        let outcome = &outcomes[0];

        assert!(matches!(outcome.error, Some(Error::Signing(_))));
        let artifact = outcome.artifact.as_ref().expect("artifact reported");
        assert!(!artifact.signed);
        assert!(artifact.path.is_file(), "unsigned artifact must survive");
    }

    #[test]
    fn test_missing_builder_tool_fails_that_format_only() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);

        let out = TempDir::new().unwrap();
        let builders = BuilderConfig {
            rpmbuild: "no-such-rpmbuild-tool".into(),
            ..BuilderConfig::default()
        };
        let orchestrator = Orchestrator::new(builders, SignerConfig::default());

        let request = RunRequest::new(vec![Format::Rpm, Format::Tar], out.path());
        let outcomes = orchestrator.run(&spec, &request);

        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());
    }
}
