// src/nvr.rs

//! NVR (name-version-release) parsing and ordering
//!
//! Builds are identified by strings of the form `name_version`, where the
//! version component may itself carry a Debian revision after its last `-`
//! (e.g. `ceph_12.2.8-1xenial`). Ordering is by name first, then by full
//! Debian version comparison, so a run always visits builds in the same
//! stable sequence.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed package build identifier
///
/// Immutable once constructed. `version` is the upstream version and
/// `release` the Debian revision; when the original string carried no
/// revision, `release` is the literal `"0"` (the tracker requires a
/// release field, Debian does not).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nvr {
    name: String,
    version: String,
    release: String,
    /// Version exactly as it appeared in the identifier, revision included
    full_version: String,
}

impl Nvr {
    /// Parse an identifier of the form `name_version[-release]`
    ///
    /// Splits on the first `_`, then splits the version component on its
    /// last `-` (the Debian revision). Fails with
    /// [`Error::MalformedIdentifier`] when there is no `_` or either side
    /// of it is empty.
    pub fn parse(raw: &str) -> Result<Self> {
        let (name, full_version) = raw
            .split_once('_')
            .ok_or_else(|| Error::MalformedIdentifier(raw.to_string()))?;
        if name.is_empty() || full_version.is_empty() {
            return Err(Error::MalformedIdentifier(raw.to_string()));
        }
        let (version, release) = match full_version.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), r.to_string()),
            None => (full_version.to_string(), "0".to_string()),
        };
        Ok(Self {
            name: name.to_string(),
            version,
            release,
            full_version: full_version.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    /// The version component as written, revision included
    pub fn full_version(&self) -> &str {
        &self.full_version
    }

    /// The build key under which the tracker knows this build
    ///
    /// Substitutes the Debian `_` separator with the tracker's `-deb-`
    /// infix: `ceph_1.2-1` becomes `ceph-deb-1.2-1`. Every call site that
    /// needs the key goes through here so the two systems cannot drift.
    pub fn tracker_key(&self) -> String {
        format!("{}-deb-{}", self.name, self.full_version)
    }
}

impl fmt::Display for Nvr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.full_version)
    }
}

impl FromStr for Nvr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Ord for Nvr {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.name.cmp(&other.name) {
            Ordering::Equal => deb_version_cmp(&self.full_version, &other.full_version),
            ord => ord,
        }
    }
}

impl PartialOrd for Nvr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two Debian version strings per dpkg semantics
///
/// Handles the `[epoch:]upstream[-revision]` structure: epochs compare
/// numerically, upstream and revision compare with alternating non-digit
/// and digit runs, and `~` sorts before everything including the empty
/// string (so `1.0~rc1` < `1.0`).
pub fn deb_version_cmp(a: &str, b: &str) -> Ordering {
    let (a_epoch, a_rest) = split_epoch(a);
    let (b_epoch, b_rest) = split_epoch(b);
    match a_epoch.cmp(&b_epoch) {
        Ordering::Equal => {}
        ord => return ord,
    }

    // Revision is everything after the LAST hyphen; upstream may contain
    // hyphens of its own.
    let (a_upstream, a_rev) = split_revision(a_rest);
    let (b_upstream, b_rev) = split_revision(b_rest);
    match verrevcmp(a_upstream, b_upstream) {
        Ordering::Equal => verrevcmp(a_rev, b_rev),
        ord => ord,
    }
}

fn split_epoch(version: &str) -> (u64, &str) {
    match version.split_once(':') {
        Some((epoch, rest)) => match epoch.parse::<u64>() {
            Ok(e) => (e, rest),
            // Not a numeric epoch: treat the colon as version content
            Err(_) => (0, version),
        },
        None => (0, version),
    }
}

fn split_revision(version: &str) -> (&str, &str) {
    match version.rsplit_once('-') {
        Some((upstream, revision)) => (upstream, revision),
        None => (version, "0"),
    }
}

/// Sort weight of a non-digit character in a Debian version
///
/// Letters sort before non-letters, and `~` sorts before everything
/// including end-of-string.
fn char_weight(c: u8) -> i32 {
    match c {
        b'~' => -1,
        b'0'..=b'9' => 0,
        b'A'..=b'Z' | b'a'..=b'z' => c as i32,
        _ => c as i32 + 256,
    }
}

/// The dpkg `verrevcmp` algorithm over one version fragment
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        // Compare the non-digit runs character by character.
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let wa = if i < a.len() && !a[i].is_ascii_digit() {
                char_weight(a[i])
            } else {
                0
            };
            let wb = if j < b.len() && !b[j].is_ascii_digit() {
                char_weight(b[j])
            } else {
                0
            };
            match wa.cmp(&wb) {
                Ordering::Equal => {}
                ord => return ord,
            }
            if i < a.len() && !a[i].is_ascii_digit() {
                i += 1;
            }
            if j < b.len() && !b[j].is_ascii_digit() {
                j += 1;
            }
        }

        // Compare the digit runs numerically: skip leading zeros, then a
        // longer run of significant digits wins, equal-length runs compare
        // lexically.
        while i < a.len() && a[i] == b'0' {
            i += 1;
        }
        while j < b.len() && b[j] == b'0' {
            j += 1;
        }
        let a_start = i;
        let b_start = j;
        while i < a.len() && a[i].is_ascii_digit() {
            i += 1;
        }
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        match (i - a_start).cmp(&(j - b_start)) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match a[a_start..i].cmp(&b[b_start..j]) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }

    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_release() {
        let nvr = Nvr::parse("ceph_1.2-1").unwrap();
        assert_eq!(nvr.name(), "ceph");
        assert_eq!(nvr.version(), "1.2");
        assert_eq!(nvr.release(), "1");
        assert_eq!(nvr.full_version(), "1.2-1");
    }

    #[test]
    fn test_parse_release_splits_on_last_hyphen() {
        let nvr = Nvr::parse("ceph_1.0-rc1-2redhat1").unwrap();
        assert_eq!(nvr.version(), "1.0-rc1");
        assert_eq!(nvr.release(), "2redhat1");
    }

    #[test]
    fn test_parse_release_defaults_to_zero() {
        let nvr = Nvr::parse("ceph-deploy_1.2").unwrap();
        assert_eq!(nvr.name(), "ceph-deploy");
        assert_eq!(nvr.version(), "1.2");
        assert_eq!(nvr.release(), "0");
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        let err = Nvr::parse("ceph-1.2-1").unwrap_err();
        assert!(matches!(err, Error::MalformedIdentifier(_)));
    }

    #[test]
    fn test_parse_rejects_empty_components() {
        assert!(Nvr::parse("_1.2").is_err());
        assert!(Nvr::parse("ceph_").is_err());
    }

    #[test]
    fn test_tracker_key() {
        let nvr = Nvr::parse("ceph_1.2-1").unwrap();
        assert_eq!(nvr.tracker_key(), "ceph-deb-1.2-1");

        let nvr = Nvr::parse("ceph-deploy_1.2-1").unwrap();
        assert_eq!(nvr.tracker_key(), "ceph-deploy-deb-1.2-1");
    }

    #[test]
    fn test_display_round_trips() {
        let nvr = Nvr::parse("ceph-ansible_3.2.0~rc3-2redhat1").unwrap();
        assert_eq!(nvr.to_string(), "ceph-ansible_3.2.0~rc3-2redhat1");
    }

    #[test]
    fn test_name_dominates_version() {
        let a = Nvr::parse("ceph_9.9-1").unwrap();
        let b = Nvr::parse("ceph-deploy_1.0-1").unwrap();
        // '-' < '_' is irrelevant: names compare as plain strings
        assert_eq!(a.cmp(&b), "ceph".cmp("ceph-deploy"));
    }

    #[test]
    fn test_version_ordering() {
        let a = Nvr::parse("pkg_1.0-1").unwrap();
        let b = Nvr::parse("pkg_2.0-1").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_deb_cmp_numeric_runs() {
        assert_eq!(deb_version_cmp("1.9", "1.10"), Ordering::Less);
        assert_eq!(deb_version_cmp("1.02", "1.2"), Ordering::Equal);
    }

    #[test]
    fn test_deb_cmp_tilde_sorts_first() {
        assert_eq!(deb_version_cmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(deb_version_cmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
    }

    #[test]
    fn test_deb_cmp_letters_before_punctuation() {
        assert_eq!(deb_version_cmp("1.0a", "1.0+"), Ordering::Less);
    }

    #[test]
    fn test_deb_cmp_epoch_dominates() {
        assert_eq!(deb_version_cmp("1:0.1", "2.0"), Ordering::Greater);
    }

    #[test]
    fn test_deb_cmp_revision() {
        assert_eq!(deb_version_cmp("1.2-1", "1.2-2"), Ordering::Less);
        assert_eq!(deb_version_cmp("1.2-1xenial", "1.2-1"), Ordering::Greater);
    }

    #[test]
    fn test_deb_cmp_upstream_with_hyphen() {
        // Revision splits on the last hyphen only.
        assert_eq!(deb_version_cmp("1.0-rc1-1", "1.0-rc1-2"), Ordering::Less);
    }

    #[test]
    fn test_sort_is_stable_and_total() {
        let mut nvrs: Vec<Nvr> = ["ceph_12.2.8-1", "ceph_12.2.10-1", "apt_1.0", "ceph_12.2.8-1"]
            .iter()
            .map(|s| Nvr::parse(s).unwrap())
            .collect();
        nvrs.sort();
        let rendered: Vec<String> = nvrs.iter().map(|n| n.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["apt_1.0", "ceph_12.2.8-1", "ceph_12.2.8-1", "ceph_12.2.10-1"]
        );
    }
}
