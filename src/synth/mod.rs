// src/synth/mod.rs

//! Format synthesis for pippack
//!
//! Each target format translates the shared `PackageSpec` into its own
//! recipe dialect and staged build-root. The formats are a closed set: a
//! synthesizer is selected once at the start of a pipeline via
//! [`Format::synthesizer`] and never re-dispatched mid-pipeline.

pub mod apk;
pub mod deb;
pub mod pacman;
pub mod rpm;
pub mod tarball;

use crate::error::{Error, Result};
use crate::spec::{EntryKind, PackageSpec};
use serde::Serialize;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// The supported package formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Tar,
    Apk,
    Deb,
    Rpm,
    Pacman,
}

impl Format {
    /// All formats, in a stable order.
    pub const ALL: [Format; 5] = [
        Format::Tar,
        Format::Apk,
        Format::Deb,
        Format::Rpm,
        Format::Pacman,
    ];

    /// Stable index into per-format tables (serialization locks, etc.).
    pub fn index(self) -> usize {
        match self {
            Format::Tar => 0,
            Format::Apk => 1,
            Format::Deb => 2,
            Format::Rpm => 3,
            Format::Pacman => 4,
        }
    }

    /// Whether this format supports a signing step. Only apk and pacman do;
    /// deb/rpm/tar artifacts pass through unsigned.
    pub fn supports_signing(self) -> bool {
        matches!(self, Format::Apk | Format::Pacman)
    }

    /// The synthesizer for this format, selected once per pipeline.
    pub fn synthesizer(self) -> Box<dyn Synthesizer> {
        match self {
            Format::Tar => Box::new(tarball::TarSynthesizer),
            Format::Apk => Box::new(apk::ApkSynthesizer),
            Format::Deb => Box::new(deb::DebSynthesizer),
            Format::Rpm => Box::new(rpm::RpmSynthesizer),
            Format::Pacman => Box::new(pacman::PacmanSynthesizer),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Format::Tar => "tar",
            Format::Apk => "apk",
            Format::Deb => "deb",
            Format::Rpm => "rpm",
            Format::Pacman => "pacman",
        };
        write!(f, "{}", name)
    }
}

/// A staged build-root: the directory tree laid out exactly as one format's
/// native builder expects its input.
///
/// The root owns its backing temporary directory and is removed when
/// dropped, on every exit path — success, build failure, or an error before
/// the builder ever ran.
pub struct BuildRoot {
    format: Format,
    dir: TempDir,
}

impl BuildRoot {
    fn new(format: Format) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("pippack-{}-", format))
            .tempdir()
            .map_err(|e| Error::Synthesis(format!("create build root: {}", e)))?;
        Ok(Self { format, dir })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl std::fmt::Debug for BuildRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildRoot")
            .field("format", &self.format)
            .field("path", &self.dir.path())
            .finish()
    }
}

/// Translates a read-only `PackageSpec` into a recipe plus staged build-root.
///
/// Purely local file and text generation; no network access.
pub trait Synthesizer {
    /// The format this synthesizer produces.
    fn format(&self) -> Format;

    /// Stage a build-root for the spec.
    fn synthesize(&self, spec: &PackageSpec) -> Result<BuildRoot>;
}

/// Resolve an install destination against a staging root, rejecting any path
/// that would escape it. Escapes are always fatal, never sanitized.
pub(crate) fn staged_path(root: &Path, dest: &Path) -> Result<PathBuf> {
    let rel = dest.strip_prefix("/").unwrap_or(dest);

    for component in rel.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(Error::Synthesis(format!(
                    "destination {} escapes the build root",
                    dest.display()
                )));
            }
        }
    }

    Ok(root.join(rel))
}

/// Materialize the spec's file manifest under `payload_root`, preserving
/// permission bits. Directories come first in manifest order, so parents
/// always exist before their contents; empty directories are staged too.
pub(crate) fn stage_payload(spec: &PackageSpec, payload_root: &Path) -> Result<()> {
    for entry in &spec.files {
        let target = staged_path(payload_root, &entry.dest)?;

        match &entry.kind {
            EntryKind::Directory => {
                fs::create_dir_all(&target)
                    .map_err(|e| Error::Synthesis(format!("mkdir {}: {}", target.display(), e)))?;
                fs::set_permissions(&target, fs::Permissions::from_mode(entry.mode)).map_err(
                    |e| Error::Synthesis(format!("chmod {}: {}", target.display(), e)),
                )?;
            }
            EntryKind::File => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        Error::Synthesis(format!("mkdir {}: {}", parent.display(), e))
                    })?;
                }
                fs::copy(&entry.source, &target).map_err(|e| {
                    Error::Synthesis(format!(
                        "copy {} -> {}: {}",
                        entry.source.display(),
                        target.display(),
                        e
                    ))
                })?;
                fs::set_permissions(&target, fs::Permissions::from_mode(entry.mode)).map_err(
                    |e| Error::Synthesis(format!("chmod {}: {}", target.display(), e)),
                )?;
            }
            EntryKind::Symlink(link_target) => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        Error::Synthesis(format!("mkdir {}: {}", parent.display(), e))
                    })?;
                }
                std::os::unix::fs::symlink(link_target, &target).map_err(|e| {
                    Error::Synthesis(format!("symlink {}: {}", target.display(), e))
                })?;
            }
        }
    }

    debug!(
        "Staged {} manifest entries under {}",
        spec.files.len(),
        payload_root.display()
    );

    Ok(())
}

/// Write a recipe file into the build root.
pub(crate) fn write_recipe(root: &Path, name: &str, content: &str) -> Result<()> {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Synthesis(format!("mkdir {}: {}", parent.display(), e)))?;
    }
    fs::write(&path, content)
        .map_err(|e| Error::Synthesis(format!("write {}: {}", path.display(), e)))
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::spec::{Arch, Dependency, EntryKind, FileEntry, PackageSpec};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A spec with one executable at /usr/bin/hello plus its parent dirs,
    /// matching the shape the collector would produce.
    pub fn hello_spec(source_dir: &TempDir) -> PackageSpec {
        let bin_dir = source_dir.path().join("usr/bin");
        fs::create_dir_all(&bin_dir).unwrap();
        let bin = bin_dir.join("hello");
        fs::write(&bin, b"#!/usr/bin/env python3\nprint('hi')\n").unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

        let files = vec![
            FileEntry {
                source: source_dir.path().join("usr"),
                dest: "/usr".into(),
                mode: 0o755,
                kind: EntryKind::Directory,
                sha256: None,
            },
            FileEntry {
                source: bin_dir.clone(),
                dest: "/usr/bin".into(),
                mode: 0o755,
                kind: EntryKind::Directory,
                sha256: None,
            },
            FileEntry {
                source: bin,
                dest: "/usr/bin/hello".into(),
                mode: 0o755,
                kind: EntryKind::File,
                sha256: None,
            },
        ];

        PackageSpec::new(
            "hello",
            "1.0",
            1,
            Arch::Noarch,
            Some("Test User <test@example.com>".to_string()),
            Some("A test package".to_string()),
            vec![
                Dependency::new("python3", None),
                Dependency::new("libfoo", Some(">=2.0".to_string())),
            ],
            files,
        )
        .unwrap()
    }

    /// A spec whose single entry tries to escape the staging root.
    pub fn traversal_spec(source_dir: &TempDir) -> PackageSpec {
        let src = source_dir.path().join("evil");
        fs::write(&src, b"boo").unwrap();

        PackageSpec::new(
            "evil",
            "1.0",
            1,
            Arch::Noarch,
            None,
            None,
            vec![],
            vec![FileEntry {
                source: src,
                dest: "/usr/../../escape".into(),
                mode: 0o644,
                kind: EntryKind::File,
                sha256: None,
            }],
        )
        .unwrap()
    }
}
