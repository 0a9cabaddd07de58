// src/manifest.rs

//! Build-manifest discovery
//!
//! Walks a directory tree for `builds-*.txt` files, reads the NVRs they
//! list, and merges everything into one NVR → tag-set mapping. A manifest
//! that cannot be classified, or a line that is not a valid NVR, is logged
//! and skipped; one bad file must not abort a whole migration run.

use crate::error::Result;
use crate::nvr::Nvr;
use crate::tags::{self, TagRules};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Find every `builds-*.txt` file under `root`
pub fn find_manifests(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with("builds-") && name.ends_with(".txt")
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Read the non-blank lines of one manifest as NVR strings
pub fn read_nvrs(manifest: &Path) -> Result<BTreeSet<String>> {
    let content = fs::read_to_string(manifest)?;
    Ok(content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Merge all manifests under `root` into one NVR → tag-set mapping
///
/// Tag sets are unioned across every manifest mentioning an NVR, then
/// override/hotfix tags covered by a base tag are pruned. The `BTreeMap`
/// key order is the Debian NVR order, which is exactly the order the
/// orchestrator processes builds in.
pub fn find_all_nvrs(root: &Path, rules: &TagRules) -> BTreeMap<Nvr, BTreeSet<String>> {
    let mut all: BTreeMap<Nvr, BTreeSet<String>> = BTreeMap::new();

    for manifest in find_manifests(root) {
        let tag_names = match rules.tag_names(&manifest.to_string_lossy()) {
            Ok(tags) => tags,
            Err(e) => {
                warn!("skipping manifest {}: {}", manifest.display(), e);
                continue;
            }
        };
        let raw_nvrs = match read_nvrs(&manifest) {
            Ok(nvrs) => nvrs,
            Err(e) => {
                warn!("skipping manifest {}: {}", manifest.display(), e);
                continue;
            }
        };
        debug!(
            "manifest {} lists {} builds for {:?}",
            manifest.display(),
            raw_nvrs.len(),
            tag_names
        );
        for raw in raw_nvrs {
            match Nvr::parse(&raw) {
                Ok(nvr) => {
                    all.entry(nvr).or_default().extend(tag_names.iter().cloned());
                }
                Err(e) => warn!("skipping line in {}: {}", manifest.display(), e),
            }
        }
    }

    for tags in all.values_mut() {
        tags::prune_inherited(tags);
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_manifest(dir: &Path, name: &str, lines: &[&str]) {
        let mut f = File::create(dir.join(name)).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
    }

    #[test]
    fn test_find_manifests_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("3.2/ubuntu");
        fs::create_dir_all(&nested).unwrap();
        write_manifest(&nested, "builds-ceph-3.2-42-xenial.txt", &["ceph_1.2-1"]);
        write_manifest(dir.path(), "notes.txt", &["not a manifest"]);

        let found = find_manifests(dir.path());
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("builds-ceph-3.2-42-xenial.txt"));
    }

    #[test]
    fn test_read_nvrs_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "builds-ceph-3.2-42-xenial.txt",
            &["ceph_1.2-1", "", "ceph-deploy_1.2"],
        );
        let nvrs = read_nvrs(&dir.path().join("builds-ceph-3.2-42-xenial.txt")).unwrap();
        assert_eq!(nvrs.len(), 2);
    }

    #[test]
    fn test_merge_unions_tags_across_manifests() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "builds-ceph-3.2-42-xenial.txt", &["ceph_1.2-1"]);
        write_manifest(dir.path(), "builds-ceph-3.2-42-bionic.txt", &["ceph_1.2-1"]);

        let all = find_all_nvrs(dir.path(), &TagRules::default());
        let nvr = Nvr::parse("ceph_1.2-1").unwrap();
        assert_eq!(
            all[&nvr],
            BTreeSet::from(["ceph-3.2-xenial".to_string(), "ceph-3.2-bionic".to_string()])
        );
    }

    #[test]
    fn test_merge_prunes_inherited_tags() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "builds-ceph-3.2-42-xenial.txt", &["ceph_1.2-1"]);
        write_manifest(
            dir.path(),
            "builds-ceph-3.2-hotfix-bz1-xenial.txt",
            &["ceph_1.2-1"],
        );

        let all = find_all_nvrs(dir.path(), &TagRules::default());
        let nvr = Nvr::parse("ceph_1.2-1").unwrap();
        assert_eq!(all[&nvr], BTreeSet::from(["ceph-3.2-xenial".to_string()]));
    }

    #[test]
    fn test_bad_lines_and_bad_manifests_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "builds-ceph-3.2-42-xenial.txt",
            &["ceph_1.2-1", "no-underscore-here"],
        );
        write_manifest(dir.path(), "builds-what.txt", &["ceph_9.9-9"]);

        let all = find_all_nvrs(dir.path(), &TagRules::default());
        assert_eq!(all.len(), 1);
        assert!(all.contains_key(&Nvr::parse("ceph_1.2-1").unwrap()));
    }
}
