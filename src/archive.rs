// src/archive.rs

//! Deterministic tarball emission
//!
//! The tar artifact itself, plus the source tarballs the apk and rpm
//! recipes reference, are written in-process rather than by shelling out.
//! Entries are emitted in manifest order with uid/gid 0 and mtime 0, so
//! identical input produces a byte-identical archive.

use crate::error::{Error, Result};
use crate::spec::{EntryKind, FileEntry};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::{Component, Path};
use tar::{Builder, EntryType, Header};
use tracing::debug;

/// Write `entries` to a gzip'd tar at `dest`, with every archive path put
/// under `prefix` (e.g. `hello-1.0`).
pub fn write_tar_gz(entries: &[FileEntry], prefix: &str, dest: &Path) -> Result<()> {
    let file = File::create(dest)
        .map_err(|e| Error::Synthesis(format!("create {}: {}", dest.display(), e)))?;
    let encoder = GzEncoder::new(file, Compression::best());
    let mut builder = Builder::new(encoder);

    for entry in entries {
        let rel = entry.dest.strip_prefix("/").unwrap_or(&entry.dest);

        // An escaping destination must never be embedded in an archive an
        // installer will unpack.
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(Error::Synthesis(format!(
                "destination {} escapes the archive root",
                entry.dest.display()
            )));
        }

        let archive_path = Path::new(prefix).join(rel);

        let mut header = Header::new_gnu();
        header.set_mode(entry.mode);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);

        match &entry.kind {
            EntryKind::Directory => {
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                builder
                    .append_data(&mut header, &archive_path, std::io::empty())
                    .map_err(|e| Error::Synthesis(format!("append dir: {}", e)))?;
            }
            EntryKind::File => {
                let content = std::fs::read(&entry.source).map_err(|e| {
                    Error::Synthesis(format!("read {}: {}", entry.source.display(), e))
                })?;
                header.set_entry_type(EntryType::Regular);
                header.set_size(content.len() as u64);
                builder
                    .append_data(&mut header, &archive_path, content.as_slice())
                    .map_err(|e| Error::Synthesis(format!("append file: {}", e)))?;
            }
            EntryKind::Symlink(target) => {
                header.set_entry_type(EntryType::Symlink);
                header.set_size(0);
                builder
                    .append_link(&mut header, &archive_path, target)
                    .map_err(|e| Error::Synthesis(format!("append symlink: {}", e)))?;
            }
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::Synthesis(format!("finish tar: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Synthesis(format!("finish gzip: {}", e)))?;

    debug!("Wrote tarball {}", dest.display());

    Ok(())
}
