// src/lib.rs

//! pippack
//!
//! Builds installable native OS packages — tarball, `.apk`, `.deb`, `.rpm`,
//! Arch `pkg.tar.*` — from pip-installable Python packages.
//!
//! # Architecture
//!
//! - One `PackageSpec` per run: collected file manifest plus metadata,
//!   validated once before any format work
//! - Closed set of format synthesizers translating the spec into each
//!   format's recipe dialect and staged build-root
//! - Native builders (`dpkg-deb`, `rpmbuild`, `abuild`, `makepkg`) invoked
//!   in scoped temporary workspaces; the tarball is written in-process
//! - apk and pacman artifacts optionally signed with a supplied key
//! - Per-format result set: one format's failure never aborts its siblings

pub mod archive;
pub mod collector;
mod error;
pub mod installer;
pub mod invoker;
pub mod orchestrator;
pub mod signer;
pub mod spec;
pub mod synth;

pub use error::{Error, Result};
