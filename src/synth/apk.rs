// src/synth/apk.rs

//! Alpine build-root synthesis
//!
//! Stages an `APKBUILD` next to a deterministic source tarball for `abuild`.
//! Alpine dependency entries go into the space-separated `depends` string
//! without constraint operators; version and release ride as the
//! `pkgver`/`pkgrel` pair.

use super::{BuildRoot, Format, Synthesizer, write_recipe};
use crate::archive;
use crate::error::Result;
use crate::spec::PackageSpec;
use tracing::debug;

pub struct ApkSynthesizer;

impl ApkSynthesizer {
    fn render_apkbuild(spec: &PackageSpec) -> String {
        let mut out = String::new();

        if let Some(maintainer) = &spec.maintainer {
            out.push_str(&format!("# Contributor: {}\n", maintainer));
            out.push_str(&format!("# Maintainer: {}\n", maintainer));
        }

        let depends: Vec<&str> = spec.dependencies.iter().map(|d| d.name.as_str()).collect();

        out.push_str(&format!("pkgname={}\n", spec.name));
        out.push_str(&format!("pkgver={}\n", spec.version));
        out.push_str(&format!("pkgrel={}\n", spec.release));
        out.push_str(&format!("pkgdesc=\"{}\"\n", sh_escape(&spec.summary())));
        out.push_str(&format!("arch=\"{}\"\n", spec.arch.apk_token()));
        out.push_str("url=\"\"\n");
        out.push_str("license=\"Unknown\"\n");
        out.push_str(&format!("depends=\"{}\"\n", depends.join(" ")));
        out.push_str("makedepends=\"\"\n");
        out.push_str("install=\"\"\n");
        out.push_str("subpackages=\"\"\n");
        out.push_str(&format!(
            "source=\"{}-{}.tar.gz\"\n",
            spec.name, spec.version
        ));
        out.push_str("builddir=\"$srcdir/$pkgname-$pkgver\"\n");

        out.push_str(
            "\nprepare() {\n\
             \t:\n\
             }\n\
             \nbuild() {\n\
             \t:\n\
             }\n\
             \ncheck() {\n\
             \t:\n\
             }\n\
             \npackage() {\n\
             \tmkdir -p \"$pkgdir\"\n\
             \tcp -a \"$builddir\"/. \"$pkgdir\"/\n\
             }\n",
        );

        out
    }
}

/// Escape a value for inclusion in a double-quoted shell string.
fn sh_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

impl Synthesizer for ApkSynthesizer {
    fn format(&self) -> Format {
        Format::Apk
    }

    fn synthesize(&self, spec: &PackageSpec) -> Result<BuildRoot> {
        let root = BuildRoot::new(Format::Apk)?;

        let source_tarball = root
            .path()
            .join(format!("{}-{}.tar.gz", spec.name, spec.version));
        archive::write_tar_gz(
            &spec.files,
            &format!("{}-{}", spec.name, spec.version),
            &source_tarball,
        )?;

        write_recipe(root.path(), "APKBUILD", &Self::render_apkbuild(spec))?;

        debug!("Staged apk build root for {}-{}", spec.name, spec.version);

        Ok(root)
    }
}
