// src/spec.rs

//! Common package representation shared by all format synthesizers
//!
//! A `PackageSpec` is built once per run from the installer output and is
//! immutable afterwards. Validation happens here, before any synthesizer
//! runs, so a bad name fails the same way for every format instead of
//! surfacing as an opaque native-builder error deep inside one of them.

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;

/// Target architecture of a package.
///
/// `Noarch` is the internal name for "architecture independent"; each format
/// synthesizer maps it to that format's own token (`all`, `noarch`, `any`) —
/// the literal string "noarch" is never passed through uninterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Noarch,
    X86_64,
    Aarch64,
}

impl Arch {
    /// Debian architecture token
    pub fn deb_token(&self) -> &'static str {
        match self {
            Arch::Noarch => "all",
            Arch::X86_64 => "amd64",
            Arch::Aarch64 => "arm64",
        }
    }

    /// RPM BuildArch token
    pub fn rpm_token(&self) -> &'static str {
        match self {
            Arch::Noarch => "noarch",
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }

    /// Alpine APKBUILD arch token
    pub fn apk_token(&self) -> &'static str {
        match self {
            Arch::Noarch => "noarch",
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }

    /// Arch Linux PKGBUILD arch token
    pub fn pacman_token(&self) -> &'static str {
        match self {
            Arch::Noarch => "any",
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl std::str::FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "noarch" | "all" | "any" => Ok(Arch::Noarch),
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            other => Err(Error::InvalidSpec {
                field: "arch",
                value: other.to_string(),
                reason: "expected noarch, x86_64 or aarch64".to_string(),
            }),
        }
    }
}

/// What kind of filesystem object a manifest entry describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink(PathBuf),
}

/// One entry in the package file manifest
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Where the content lives in the installer output tree
    pub source: PathBuf,
    /// Absolute install path, interpreted relative to the build root
    pub dest: PathBuf,
    /// Permission bits from the source tree
    pub mode: u32,
    pub kind: EntryKind,
    /// SHA-256 of the content; regular files only
    pub sha256: Option<String>,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// A declared OS-level dependency
///
/// The constraint is an opaque `>=2.0`-style string; how (and whether) it is
/// rendered is each format synthesizer's responsibility.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub constraint: Option<String>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, constraint: Option<String>) -> Self {
        Self {
            name: name.into(),
            constraint,
        }
    }

    /// Parse a CLI-style dependency token, e.g. `libfoo`, `libfoo>=2.0`,
    /// `libfoo = 1.2`.
    pub fn parse(token: &str) -> Self {
        match token.find(['>', '<', '=']) {
            Some(idx) => {
                let (name, constraint) = token.split_at(idx);
                Self {
                    name: name.trim().to_string(),
                    constraint: Some(constraint.trim().to_string()),
                }
            }
            None => Self {
                name: token.trim().to_string(),
                constraint: None,
            },
        }
    }

    /// Split the constraint into operator and version, e.g. `>=2.0` into
    /// `(">=", "2.0")`. Returns None for a constraint-less dependency, so a
    /// synthesizer never has a dangling operator to emit.
    pub fn constraint_parts(&self) -> Option<(&str, &str)> {
        let constraint = self.constraint.as_deref()?;
        let ver_start = constraint
            .find(|c: char| !matches!(c, '>' | '<' | '=' | ' '))
            .unwrap_or(constraint.len());
        let (op, ver) = constraint.split_at(ver_start);
        Some((op.trim(), ver.trim()))
    }
}

/// The common in-memory package representation consumed by every synthesizer
#[derive(Debug, Clone)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    /// Package release/iteration, 1-based; deb folds it into the version
    /// string, rpm/apk/pacman carry it as a separate field
    pub release: u32,
    pub arch: Arch,
    pub maintainer: Option<String>,
    pub description: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub files: Vec<FileEntry>,
}

impl PackageSpec {
    /// Build and validate a spec. Name and version must be non-empty and
    /// restricted to the shared character class (letters, digits, `-`, `_`,
    /// `.`) that every target format accepts; release must be at least 1.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release: u32,
        arch: Arch,
        maintainer: Option<String>,
        description: Option<String>,
        dependencies: Vec<Dependency>,
        files: Vec<FileEntry>,
    ) -> Result<Self> {
        let name = name.into();
        let version = version.into();

        validate_token("name", &name)?;
        validate_token("version", &version)?;

        if release < 1 {
            return Err(Error::InvalidSpec {
                field: "release",
                value: release.to_string(),
                reason: "release must be at least 1".to_string(),
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for entry in &files {
            if !seen.insert(&entry.dest) {
                return Err(Error::InvalidSpec {
                    field: "files",
                    value: entry.dest.display().to_string(),
                    reason: "duplicate destination path in manifest".to_string(),
                });
            }
        }

        Ok(Self {
            name,
            version,
            release,
            arch,
            maintainer,
            description,
            dependencies,
            files,
        })
    }

    /// Short description, falling back to a generated one like the deb/rpm
    /// recipes need a non-empty summary line.
    pub fn summary(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("local package for {}", self.name))
    }
}

/// Shared character-class rule for name and version fields.
fn validate_token(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidSpec {
            field,
            value: value.to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    match value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '-' | '_' | '.')))
    {
        Some(bad) => Err(Error::InvalidSpec {
            field,
            value: value.to_string(),
            reason: format!("character {:?} is not allowed in any target format", bad),
        }),
        None => Ok(()),
    }
}
