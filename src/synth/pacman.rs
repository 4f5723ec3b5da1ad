// src/synth/pacman.rs

//! Arch Linux build-root synthesis
//!
//! Stages a `PKGBUILD` and source tarball for `makepkg`. Dependencies use
//! the quoted array syntax with compact constraints (`'libfoo>=2.0'`);
//! version and release ride as the `pkgver`/`pkgrel` pair.

use super::{BuildRoot, Format, Synthesizer, write_recipe};
use crate::archive;
use crate::error::Result;
use crate::spec::{Dependency, PackageSpec};
use tracing::debug;

pub struct PacmanSynthesizer;

impl PacmanSynthesizer {
    fn render_pkgbuild(spec: &PackageSpec) -> String {
        let mut out = String::new();

        if let Some(maintainer) = &spec.maintainer {
            out.push_str(&format!("# Maintainer: {}\n", maintainer));
        }

        let depends: Vec<String> =
            spec.dependencies.iter().map(Self::render_dependency).collect();

        out.push_str(&format!("pkgname={}\n", spec.name));
        out.push_str(&format!("pkgver={}\n", spec.version));
        out.push_str(&format!("pkgrel={}\n", spec.release));
        out.push_str(&format!(
            "pkgdesc=\"{}\"\n",
            spec.summary().replace('\\', "\\\\").replace('"', "\\\"")
        ));
        out.push_str(&format!("arch=('{}')\n", spec.arch.pacman_token()));
        out.push_str("url=\"\"\n");
        out.push_str("license=('unknown')\n");
        out.push_str(&format!("depends=({})\n", depends.join(" ")));
        out.push_str("source=(\"$pkgname-$pkgver.tar.gz\")\n");
        out.push_str("sha256sums=('SKIP')\n");

        out.push_str(
            "\npackage() {\n\
             \tcp -a \"$srcdir/$pkgname-$pkgver/.\" \"$pkgdir/\"\n\
             }\n",
        );

        out
    }

    /// `'libfoo>=2.0'` with a constraint, `'libfoo'` without one.
    fn render_dependency(dep: &Dependency) -> String {
        match dep.constraint_parts() {
            Some((op, ver)) => format!("'{}{}{}'", dep.name, op, ver),
            None => format!("'{}'", dep.name),
        }
    }
}

impl Synthesizer for PacmanSynthesizer {
    fn format(&self) -> Format {
        Format::Pacman
    }

    fn synthesize(&self, spec: &PackageSpec) -> Result<BuildRoot> {
        let root = BuildRoot::new(Format::Pacman)?;

        let source_tarball = root
            .path()
            .join(format!("{}-{}.tar.gz", spec.name, spec.version));
        archive::write_tar_gz(
            &spec.files,
            &format!("{}-{}", spec.name, spec.version),
            &source_tarball,
        )?;

        write_recipe(root.path(), "PKGBUILD", &Self::render_pkgbuild(spec))?;

        debug!("Staged pacman build root for {}-{}", spec.name, spec.version);

        Ok(root)
    }
}
