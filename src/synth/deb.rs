// src/synth/deb.rs

//! Debian build-root synthesis
//!
//! Stages the payload at the build-root top level with package metadata in
//! `DEBIAN/control`, the layout `dpkg-deb --build` consumes directly.
//! Dependency constraints render as `name (>= ver)`, comma-joined; the
//! release is folded into the version string as `Version: version-release`.

use super::{BuildRoot, Format, Synthesizer, stage_payload, write_recipe};
use crate::error::Result;
use crate::spec::{Dependency, PackageSpec};
use tracing::debug;

pub struct DebSynthesizer;

impl DebSynthesizer {
    fn render_control(spec: &PackageSpec) -> String {
        let mut control = String::new();
        control.push_str(&format!("Package: {}\n", spec.name));
        control.push_str(&format!("Version: {}-{}\n", spec.version, spec.release));
        control.push_str(&format!("Architecture: {}\n", spec.arch.deb_token()));

        if let Some(maintainer) = &spec.maintainer {
            control.push_str(&format!("Maintainer: {}\n", maintainer));
        }

        if !spec.dependencies.is_empty() {
            let depends: Vec<String> =
                spec.dependencies.iter().map(Self::render_dependency).collect();
            control.push_str(&format!("Depends: {}\n", depends.join(", ")));
        }

        control.push_str(&format!("Description: {}\n", spec.summary()));
        control
    }

    /// `libfoo (>= 2.0)` with a constraint, bare `libfoo` without one — a
    /// constraint-less dependency never emits empty parentheses.
    fn render_dependency(dep: &Dependency) -> String {
        match dep.constraint_parts() {
            Some((op, ver)) => format!("{} ({} {})", dep.name, op, ver),
            None => dep.name.clone(),
        }
    }
}

impl Synthesizer for DebSynthesizer {
    fn format(&self) -> Format {
        Format::Deb
    }

    fn synthesize(&self, spec: &PackageSpec) -> Result<BuildRoot> {
        let root = BuildRoot::new(Format::Deb)?;
        stage_payload(spec, root.path())?;
        write_recipe(root.path(), "DEBIAN/control", &Self::render_control(spec))?;

        debug!("Staged deb build root for {}-{}", spec.name, spec.version);

        Ok(root)
    }
}
