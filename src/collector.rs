// src/collector.rs

//! Installed-tree collection
//!
//! Walks an installer output root and produces the ordered file manifest a
//! `PackageSpec` carries. The traversal is read-only; the source tree is
//! never mutated. Directories are emitted before their contents, which the
//! recipe syntaxes of several formats rely on.

use crate::error::{Error, Result};
use crate::spec::{EntryKind, FileEntry};
use sha2::{Digest, Sha256};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Collect every regular file, symbolic link, and directory under `root`
/// into an ordered manifest, preserving relative paths and permission bits.
///
/// Fails with `CollectionError` if the root does not exist or contains no
/// entries — an installer that produced nothing is a fatal misconfiguration,
/// never something to skip silently.
pub fn collect(root: &Path) -> Result<Vec<FileEntry>> {
    if !root.is_dir() {
        return Err(Error::Collection(format!(
            "installed tree not found at {}",
            root.display()
        )));
    }

    let mut entries = Vec::new();

    // walkdir yields a directory before its contents; sorting by file name
    // makes the manifest order stable across runs.
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .skip(1)
    {
        let entry = entry.map_err(|e| Error::Collection(format!("walk failed: {}", e)))?;

        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::Collection(format!("path outside root: {}", e)))?;

        let meta = entry
            .path()
            .symlink_metadata()
            .map_err(|e| Error::Collection(format!("stat {}: {}", entry.path().display(), e)))?;

        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).map_err(|e| {
                Error::Collection(format!("readlink {}: {}", entry.path().display(), e))
            })?;
            EntryKind::Symlink(target)
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        let sha256 = match kind {
            EntryKind::File => Some(hash_file(entry.path())?),
            _ => None,
        };

        entries.push(FileEntry {
            source: entry.path().to_path_buf(),
            dest: Path::new("/").join(rel),
            mode: meta.permissions().mode() & 0o7777,
            kind,
            sha256,
        });
    }

    if entries.is_empty() {
        return Err(Error::Collection(format!(
            "installed tree at {} is empty",
            root.display()
        )));
    }

    debug!("Collected {} entries from {}", entries.len(), root.display());

    Ok(entries)
}

/// SHA-256 of a regular file's content.
fn hash_file(path: &Path) -> Result<String> {
    let content = fs::read(path)
        .map_err(|e| Error::Collection(format!("read {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}
