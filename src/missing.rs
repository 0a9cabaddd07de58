// src/missing.rs

//! Pre-migration completeness check
//!
//! Walks the same manifest tree as a sync run, but instead of importing
//! anything it asks the store which source files each build has and
//! cross-checks them against the build's own descriptor and change
//! manifest. Presence-only: checksums are verified later, once artifacts
//! are actually fetched.

use crate::control::Control;
use crate::error::{Error, Result};
use crate::manifest;
use crate::nvr::Nvr;
use crate::store::StoreClient;
use crate::tags::TagRules;
use crate::verify;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, error, info};

/// Find exactly one filename with an extension in a listing
fn find_one_name<'a>(names: &'a BTreeSet<String>, extension: &str) -> Result<&'a str> {
    let suffix = format!(".{extension}");
    let mut found = None;
    for name in names {
        if name.ends_with(&suffix) {
            if found.is_some() {
                return Err(Error::MultipleFilesFound(format!(".{extension}")));
            }
            found = Some(name.as_str());
        }
    }
    found.ok_or_else(|| Error::NoFilesFound(format!(".{extension}")))
}

/// Check that one build's source files are complete in the store
pub fn check_build(store: &StoreClient, nvr: &Nvr) -> Result<()> {
    let names = store.source_filenames(nvr)?;

    let dsc_name =
        find_one_name(&names, "dsc").map_err(|e| e.with_context(&nvr.to_string()))?;
    let dsc = Control::parse(&store.fetch_source_text(nvr, dsc_name)?)?;
    verify::verify_remote_presence(&dsc, &names)?;

    let changes_name =
        find_one_name(&names, "changes").map_err(|e| e.with_context(&nvr.to_string()))?;
    let changes = Control::parse(&store.fetch_source_text(nvr, changes_name)?)?;
    if changes.files()?.is_empty() {
        return Err(Error::NoFilesFound(format!("no files in {changes_name}")));
    }
    debug!("{} is complete", nvr);
    Ok(())
}

/// Report every build under `root` that is missing files in the store
///
/// Returns the number of incomplete builds; each problem is logged as it
/// is found so the report is useful even when interrupted.
pub fn run(store: &StoreClient, root: &Path, rules: &TagRules) -> Result<usize> {
    let all_nvrs = manifest::find_all_nvrs(root, rules);
    let mut incomplete = 0;
    for nvr in all_nvrs.keys() {
        debug!("nvr: \"{}\"", nvr);
        if let Err(e) = check_build(store, nvr) {
            error!("{}: {}", nvr, e);
            incomplete += 1;
        }
    }
    info!(
        "{} of {} builds incomplete in the store",
        incomplete,
        all_nvrs.len()
    );
    Ok(incomplete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_one_name() {
        let names = BTreeSet::from([
            "ceph_12.2.8-1xenial.dsc".to_string(),
            "ceph_12.2.8.orig.tar.gz".to_string(),
        ]);
        assert_eq!(
            find_one_name(&names, "dsc").unwrap(),
            "ceph_12.2.8-1xenial.dsc"
        );
        assert!(matches!(
            find_one_name(&names, "changes"),
            Err(Error::NoFilesFound(_))
        ));
    }

    #[test]
    fn test_find_one_name_rejects_duplicates() {
        let names = BTreeSet::from(["a.dsc".to_string(), "b.dsc".to_string()]);
        assert!(matches!(
            find_one_name(&names, "dsc"),
            Err(Error::MultipleFilesFound(_))
        ));
    }
}
