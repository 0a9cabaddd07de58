// src/locator.rs

//! Artifact acquisition seam
//!
//! The import engine only needs "give me a local directory holding every
//! artifact of this build". In production that is the HTTP source store
//! ([`crate::store::StoreClient`]); for already-fetched builds and for
//! tests it is a plain directory tree keyed by NVR.

use crate::error::{Error, Result};
use crate::nvr::Nvr;
use std::path::{Path, PathBuf};

/// Something that can materialize a build's artifacts on local disk
pub trait ArtifactSource {
    /// Fetch (or locate) the build's artifacts, returning the directory
    /// that holds them
    fn fetch_build(&self, nvr: &Nvr) -> Result<PathBuf>;
}

/// A local directory tree with one subdirectory per NVR
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactSource for LocalTree {
    fn fetch_build(&self, nvr: &Nvr) -> Result<PathBuf> {
        let dir = self.root.join(nvr.to_string());
        if !dir.is_dir() {
            return Err(Error::MissingArtifact(format!(
                "no local artifacts for {nvr} under {}",
                self.root.display()
            )));
        }
        Ok(dir)
    }
}

/// List the plain files directly inside a build directory
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_tree_finds_nvr_directory() {
        let dir = tempfile::tempdir().unwrap();
        let build_dir = dir.path().join("ceph_1.2-1");
        std::fs::create_dir(&build_dir).unwrap();

        let tree = LocalTree::new(dir.path());
        let nvr = Nvr::parse("ceph_1.2-1").unwrap();
        assert_eq!(tree.fetch_build(&nvr).unwrap(), build_dir);
    }

    #[test]
    fn test_local_tree_missing_build() {
        let dir = tempfile::tempdir().unwrap();
        let tree = LocalTree::new(dir.path());
        let nvr = Nvr::parse("ceph_1.2-1").unwrap();
        assert!(matches!(
            tree.fetch_build(&nvr),
            Err(Error::MissingArtifact(_))
        ));
    }
}
