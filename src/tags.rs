// src/tags.rs

//! Release-tag derivation from manifest filenames
//!
//! Build manifests are named `builds-<base>[-async]-<extra>.txt` and the
//! trailing segment encodes which tracker tag the listed builds belong to:
//! a standard release (`42-xenial`), an override channel
//! (`override-xenial`), or a hotfix channel (anything else containing a
//! known distribution codename).

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// `builds-<base>[-async]-<extra>.txt`
static MANIFEST_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^builds-(\w+-[0-9.]+)(?:-async)?-([\w\-]+)\.txt$").unwrap());

/// Classification rules for manifest filenames
///
/// Both tables are configuration rather than literals baked into the
/// classifier: the distro set grows over time, and the legacy prefixes
/// are a compatibility rule for one product family.
#[derive(Debug, Clone)]
pub struct TagRules {
    /// Known distribution codenames, matched inside manifest suffixes
    pub distros: Vec<String>,
    /// Base-name prefixes that collapse to their major form
    /// (e.g. `ceph-2.5` tags under `ceph-2`)
    pub legacy_prefixes: Vec<String>,
}

impl Default for TagRules {
    fn default() -> Self {
        Self {
            distros: ["precise", "trusty", "xenial", "bionic"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            legacy_prefixes: ["ceph-1.3", "ceph-2"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TagRules {
    /// Find the known distro codename appearing anywhere in `s`
    fn find_distro<'a>(&'a self, s: &str) -> Result<&'a str> {
        self.distros
            .iter()
            .find(|d| s.contains(d.as_str()))
            .map(|d| d.as_str())
            .ok_or_else(|| Error::UnknownDistribution(s.to_string()))
    }

    /// Collapse a legacy-prefixed base name to its major form
    fn normalize_base<'a>(&'a self, base: &'a str) -> &'a str {
        for prefix in &self.legacy_prefixes {
            if base.starts_with(prefix.as_str()) {
                return prefix;
            }
        }
        base
    }

    /// Derive the tracker tag names implied by a manifest filename
    ///
    /// Always yields a one-element set; a set is kept so callers can merge
    /// the output across manifests uniformly.
    pub fn tag_names(&self, filename: &str) -> Result<BTreeSet<String>> {
        let basename = filename.rsplit('/').next().unwrap_or(filename);
        let caps = MANIFEST_NAME
            .captures(basename)
            .ok_or_else(|| Error::UnrecognizedManifestName(basename.to_string()))?;
        let base = self.normalize_base(&caps[1]);
        let extra = &caps[2];

        // Standard release: numeric compose id plus a distro codename.
        if let Some(distro) = extra
            .split_once('-')
            .filter(|(id, _)| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
            .map(|(_, rest)| rest)
            .filter(|rest| self.distros.iter().any(|d| d == rest))
        {
            return Ok(BTreeSet::from([format!("{base}-{distro}")]));
        }

        // Override channel.
        if let Some(distro) = extra
            .strip_prefix("override-")
            .filter(|rest| self.distros.iter().any(|d| d == rest))
        {
            return Ok(BTreeSet::from([format!("{base}-{distro}-override")]));
        }

        // Everything else is a hotfix for whichever distro it mentions.
        let distro = self.find_distro(extra)?;
        Ok(BTreeSet::from([format!("{base}-{distro}-hotfix")]))
    }
}

/// Drop override/hotfix tags whose base tag is also present
///
/// The tracker inherits builds from a base tag into its `-override` and
/// `-hotfix` children, so tagging into both would be redundant.
pub fn prune_inherited(tags: &mut BTreeSet<String>) {
    let redundant: Vec<String> = tags
        .iter()
        .filter(|tag| {
            let base = tag
                .strip_suffix("-hotfix")
                .or_else(|| tag.strip_suffix("-override"));
            base.is_some_and(|b| tags.contains(b))
        })
        .cloned()
        .collect();
    for tag in redundant {
        tags.remove(&tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(filename: &str) -> BTreeSet<String> {
        TagRules::default().tag_names(filename).unwrap()
    }

    #[test]
    fn test_standard_release_tag() {
        assert_eq!(
            tags("builds-ceph-3.2-42-xenial.txt"),
            BTreeSet::from(["ceph-3.2-xenial".to_string()])
        );
    }

    #[test]
    fn test_async_manifest() {
        assert_eq!(
            tags("builds-ceph-3.2-async-42-xenial.txt"),
            BTreeSet::from(["ceph-3.2-xenial".to_string()])
        );
    }

    #[test]
    fn test_override_tag() {
        assert_eq!(
            tags("builds-ceph-3.2-override-xenial.txt"),
            BTreeSet::from(["ceph-3.2-xenial-override".to_string()])
        );
    }

    #[test]
    fn test_hotfix_tag() {
        assert_eq!(
            tags("builds-ceph-3.2-cve-2019-xenial-fix.txt"),
            BTreeSet::from(["ceph-3.2-xenial-hotfix".to_string()])
        );
    }

    #[test]
    fn test_legacy_base_collapses() {
        assert_eq!(
            tags("builds-ceph-2.5-7-trusty.txt"),
            BTreeSet::from(["ceph-2-trusty".to_string()])
        );
        assert_eq!(
            tags("builds-ceph-1.3.2-3-precise.txt"),
            BTreeSet::from(["ceph-1.3-precise".to_string()])
        );
    }

    #[test]
    fn test_full_path_uses_basename() {
        assert_eq!(
            tags("some/tree/builds-ceph-3.2-42-xenial.txt"),
            BTreeSet::from(["ceph-3.2-xenial".to_string()])
        );
    }

    #[test]
    fn test_unrecognized_name() {
        let err = TagRules::default().tag_names("release-notes.txt").unwrap_err();
        assert!(matches!(err, Error::UnrecognizedManifestName(_)));
    }

    #[test]
    fn test_unknown_distribution() {
        let err = TagRules::default()
            .tag_names("builds-ceph-3.2-hotfix-sarge.txt")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDistribution(_)));
    }

    #[test]
    fn test_prune_inherited_hotfix() {
        let mut set = BTreeSet::from([
            "ceph-3.2-xenial".to_string(),
            "ceph-3.2-xenial-hotfix".to_string(),
        ]);
        prune_inherited(&mut set);
        assert_eq!(set, BTreeSet::from(["ceph-3.2-xenial".to_string()]));
    }

    #[test]
    fn test_prune_inherited_override() {
        let mut set = BTreeSet::from([
            "ceph-3.2-xenial".to_string(),
            "ceph-3.2-xenial-override".to_string(),
        ]);
        prune_inherited(&mut set);
        assert_eq!(set, BTreeSet::from(["ceph-3.2-xenial".to_string()]));
    }

    #[test]
    fn test_prune_keeps_orphan_suffix_tags() {
        let mut set = BTreeSet::from(["ceph-3.2-xenial-hotfix".to_string()]);
        prune_inherited(&mut set);
        assert_eq!(set, BTreeSet::from(["ceph-3.2-xenial-hotfix".to_string()]));
    }
}
