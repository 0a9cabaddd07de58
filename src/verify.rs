// src/verify.rs

//! Artifact-set integrity verification
//!
//! A build is only importable when every file its source descriptor
//! declares is present with the declared md5. Before download, the same
//! declaration can be checked against a remote file listing by name only;
//! full checksum verification happens once the artifacts are local.

use crate::checksum;
use crate::control::Control;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Verify descriptor-declared files on local disk, returning their paths
///
/// Fails with [`Error::NoFilesFound`] when the descriptor declares
/// nothing, [`Error::MissingArtifact`] when a declared file is absent, and
/// [`Error::ChecksumMismatch`] when a file's md5 disagrees with the
/// declaration.
pub fn verify_sources(dsc: &Control, dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = dsc.files()?;
    if entries.is_empty() {
        return Err(Error::NoFilesFound(format!(
            "descriptor declares no files in {}",
            dir.display()
        )));
    }

    let mut paths = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = dir.join(&entry.name);
        if !path.is_file() {
            return Err(Error::MissingArtifact(path.display().to_string()));
        }
        let digest = checksum::md5_hex(&path)?;
        if !digest.eq_ignore_ascii_case(&entry.md5sum) {
            return Err(Error::ChecksumMismatch(format!(
                "{}: declared {} got {}",
                path.display(),
                entry.md5sum,
                digest
            )));
        }
        debug!("verified {}", path.display());
        paths.push(path);
    }
    Ok(paths)
}

/// Check descriptor-declared filenames against a remote listing
///
/// Presence-only: the store declares its own checksums per binary, so this
/// runs before download to spot incomplete builds cheaply.
pub fn verify_remote_presence(dsc: &Control, available: &BTreeSet<String>) -> Result<()> {
    let entries = dsc.files()?;
    if entries.is_empty() {
        return Err(Error::NoFilesFound("descriptor declares no files".to_string()));
    }
    let missing: Vec<&str> = entries
        .iter()
        .filter(|entry| !available.contains(&entry.name))
        .map(|entry| entry.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingArtifact(format!(
            "descriptor links to {}",
            missing.join(" ")
        )));
    }
    Ok(())
}
