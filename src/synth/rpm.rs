// src/synth/rpm.rs

//! RPM build-root synthesis
//!
//! Lays out an rpmbuild topdir (`SPECS/`, `SOURCES/`, `BUILD/`, `RPMS/`)
//! with a generated `.spec` and a deterministic source tarball. `rpmbuild`
//! is later pointed at the topdir with `--define "_topdir ..."`; it unpacks
//! the source tarball in `%prep` and copies it into `%{buildroot}` in
//! `%install`.

use super::{BuildRoot, Format, Synthesizer, write_recipe};
use crate::archive;
use crate::error::{Error, Result};
use crate::spec::PackageSpec;
use std::fs;
use tracing::debug;

pub struct RpmSynthesizer;

impl RpmSynthesizer {
    fn render_spec(spec: &PackageSpec) -> String {
        let mut out = String::new();
        out.push_str(&format!("Summary: {}\n", spec.summary()));
        out.push_str(&format!("Name: {}\n", spec.name));
        out.push_str(&format!("Version: {}\n", spec.version));
        out.push_str(&format!("Release: {}\n", spec.release));
        out.push_str(&format!("BuildArch: {}\n", spec.arch.rpm_token()));
        out.push_str("License: Unknown\n");

        if let Some(maintainer) = &spec.maintainer {
            out.push_str(&format!("Packager: {}\n", maintainer));
        }

        for dep in &spec.dependencies {
            match dep.constraint_parts() {
                Some((op, ver)) => {
                    out.push_str(&format!("Requires: {} {} {}\n", dep.name, op, ver))
                }
                None => out.push_str(&format!("Requires: {}\n", dep.name)),
            }
        }

        out.push_str("Source0: %{name}-%{version}.tar.gz\n");
        out.push_str("BuildRoot: %{_tmppath}/%{name}-%{version}-root\n");

        out.push_str(&format!("\n%description\n{}\n", spec.summary()));

        out.push_str(
            "\n%prep\n\
             %setup -q\n\
             \n%build\n\
             \n%install\n\
             rm -rf %{buildroot}\n\
             mkdir -p %{buildroot}\n\
             cp -a . %{buildroot}/\n\
             \n%clean\n\
             rm -rf %{buildroot}\n",
        );

        out.push_str("\n%files\n%defattr(-, root, root)\n");
        for entry in &spec.files {
            if entry.is_dir() {
                out.push_str(&format!("%dir {}\n", entry.dest.display()));
            } else {
                out.push_str(&format!("{}\n", entry.dest.display()));
            }
        }

        out
    }
}

impl Synthesizer for RpmSynthesizer {
    fn format(&self) -> Format {
        Format::Rpm
    }

    fn synthesize(&self, spec: &PackageSpec) -> Result<BuildRoot> {
        let root = BuildRoot::new(Format::Rpm)?;

        for dir in ["BUILD", "RPMS", "SOURCES", "SPECS"] {
            fs::create_dir(root.path().join(dir))
                .map_err(|e| Error::Synthesis(format!("mkdir {}: {}", dir, e)))?;
        }

        let source_tarball = root
            .path()
            .join("SOURCES")
            .join(format!("{}-{}.tar.gz", spec.name, spec.version));
        archive::write_tar_gz(
            &spec.files,
            &format!("{}-{}", spec.name, spec.version),
            &source_tarball,
        )?;

        write_recipe(
            root.path(),
            &format!("SPECS/{}.spec", spec.name),
            &Self::render_spec(spec),
        )?;

        debug!("Staged rpm topdir for {}-{}", spec.name, spec.version);

        Ok(root)
    }
}
