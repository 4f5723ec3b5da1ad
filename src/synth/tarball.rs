// src/synth/tarball.rs

//! Plain tarball output
//!
//! The simplest target: no recipe at all, just the staged payload. The
//! archive itself is written in-process from the manifest (see
//! `crate::archive`), with the version embedded in the artifact filename
//! `name-version.tar.gz`.

use super::{BuildRoot, Format, Synthesizer, stage_payload};
use crate::error::Result;
use crate::spec::PackageSpec;

pub struct TarSynthesizer;

impl Synthesizer for TarSynthesizer {
    fn format(&self) -> Format {
        Format::Tar
    }

    fn synthesize(&self, spec: &PackageSpec) -> Result<BuildRoot> {
        let root = BuildRoot::new(Format::Tar)?;
        stage_payload(spec, root.path())?;
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::testutil::hello_spec;
    use tempfile::TempDir;

    #[test]
    fn test_payload_staged_with_mode() {
        use std::os::unix::fs::PermissionsExt;

        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);

        let root = TarSynthesizer.synthesize(&spec).unwrap();
        let bin = root.path().join("usr/bin/hello");
        assert!(bin.is_file());

        let mode = bin.metadata().unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn test_no_recipe_emitted() {
        let source = TempDir::new().unwrap();
        let spec = hello_spec(&source);

        let root = TarSynthesizer.synthesize(&spec).unwrap();
        let names: Vec<String> = std::fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["usr"], "tar build root is payload only");
    }
}
