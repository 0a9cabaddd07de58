// src/sync.rs

//! Migration run orchestration
//!
//! Walks a manifest tree, sorts the discovered NVRs, and for each build
//! runs the two idempotent phases: ensure it is imported, then ensure it
//! carries every required tag. Failures are contained per build; one bad
//! build never stops the run, it only makes the final report non-clean.

use crate::error::{Error, Result};
use crate::import;
use crate::locator::ArtifactSource;
use crate::manifest;
use crate::tags::TagRules;
use crate::tracker::{self, BuildInfo, TaskOutcome, TrackerSession};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info};

/// Options for one `sync` run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// SCM URL template with a `{name}` placeholder
    pub scm_template: String,
    /// Tracker user that will own every imported build
    pub owner: String,
    /// Log what would happen without mutating either remote system
    pub dryrun: bool,
}

/// Outcome counts for a run
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncReport {
    pub processed: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Ensure a build carries every tag in `tags`
///
/// Tags are visited in sorted order; a tag the tracker already lists the
/// build under is skipped. Tag requests are asynchronous tracker tasks,
/// so the batch blocks until every task terminates and fails with
/// [`Error::TaggingFailed`] if any did not succeed.
pub fn ensure_tagged(
    session: &dyn TrackerSession,
    buildinfo: &BuildInfo,
    tags: &BTreeSet<String>,
    dryrun: bool,
) -> Result<()> {
    let nvr = buildinfo.nvr();
    let mut task_ids = Vec::new();
    for tag in tags {
        let tagged = session.list_tagged(tag, &buildinfo.name, "debian")?;
        if tagged.iter().any(|build| build.nvr() == nvr) {
            info!("{} is already tagged into {}", nvr, tag);
            continue;
        }
        info!("tagging {} into {}", nvr, tag);
        if dryrun {
            continue;
        }
        task_ids.push(session.tag_build(tag, &nvr)?);
    }
    if !task_ids.is_empty() && session.watch_tasks(&task_ids)? == TaskOutcome::SomeFailed {
        return Err(Error::TaggingFailed(nvr));
    }
    Ok(())
}

/// Run a full migration over the manifest tree at `root`
///
/// Verifies the owning user up front, then processes builds strictly
/// sequentially in NVR order. Returns the per-build failure count; the
/// caller decides the process exit status from it.
pub fn run(
    session: &dyn TrackerSession,
    source: &dyn ArtifactSource,
    root: &Path,
    rules: &TagRules,
    opts: &SyncOptions,
) -> Result<SyncReport> {
    tracker::verify_user(session, &opts.owner)?;

    let all_nvrs = manifest::find_all_nvrs(root, rules);
    info!("{} builds listed under {}", all_nvrs.len(), root.display());

    let mut report = SyncReport::default();
    for (nvr, tags) in &all_nvrs {
        info!("nvr: \"{}\"", nvr);
        report.processed += 1;

        let buildinfo = match import::ensure_uploaded(
            session,
            source,
            nvr,
            &opts.scm_template,
            &opts.owner,
            opts.dryrun,
        ) {
            Ok(Some(buildinfo)) => buildinfo,
            Ok(None) => {
                // Dry run with no existing build: fake the minimal build
                // info so tag intentions still get logged.
                BuildInfo {
                    name: nvr.name().to_string(),
                    version: nvr.version().to_string(),
                    release: nvr.release().to_string(),
                }
            }
            Err(e) => {
                error!("import of {} failed: {}", nvr, e);
                report.failed += 1;
                continue;
            }
        };

        if let Err(e) = ensure_tagged(session, &buildinfo, tags, opts.dryrun) {
            error!("tagging of {} failed: {}", nvr, e);
            report.failed += 1;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{TagInfo, TaskId, UserInfo};
    use std::cell::RefCell;

    /// In-memory tracker that records mutating calls
    #[derive(Default)]
    struct MockTracker {
        builds: Vec<BuildInfo>,
        tagged: Vec<(String, String)>, // (tag, nvr)
        tag_calls: RefCell<Vec<(String, String)>>,
        fail_tasks: bool,
    }

    impl TrackerSession for MockTracker {
        fn get_build(&self, key: &str) -> Result<Option<BuildInfo>> {
            Ok(self
                .builds
                .iter()
                .find(|b| format!("{}-deb-{}-{}", b.name, b.version, b.release) == key)
                .cloned())
        }

        fn get_user(&self, name: &str) -> Result<Option<UserInfo>> {
            Ok(Some(UserInfo { name: name.to_string() }))
        }

        fn get_tag(&self, name: &str) -> Result<Option<TagInfo>> {
            Ok(Some(TagInfo { name: name.to_string() }))
        }

        fn list_tagged(
            &self,
            tag: &str,
            package: &str,
            _build_type: &str,
        ) -> Result<Vec<BuildInfo>> {
            Ok(self
                .tagged
                .iter()
                .filter(|(t, nvr)| t == tag && nvr.starts_with(package))
                .map(|(_, nvr)| {
                    let mut parts = nvr.rsplitn(3, '-');
                    let release = parts.next().unwrap().to_string();
                    let version = parts.next().unwrap().to_string();
                    let name = parts.next().unwrap().to_string();
                    BuildInfo { name, version, release }
                })
                .collect())
        }

        fn upload(&self, _local_path: &std::path::Path, _remote_path: &str) -> Result<()> {
            Ok(())
        }

        fn cg_import(
            &self,
            _metadata: &serde_json::Value,
            _remote_dir: &str,
        ) -> Result<BuildInfo> {
            unimplemented!("not exercised by these tests")
        }

        fn tag_build(&self, tag: &str, nvr: &str) -> Result<TaskId> {
            self.tag_calls
                .borrow_mut()
                .push((tag.to_string(), nvr.to_string()));
            Ok(self.tag_calls.borrow().len() as TaskId)
        }

        fn watch_tasks(&self, _task_ids: &[TaskId]) -> Result<TaskOutcome> {
            Ok(if self.fail_tasks {
                TaskOutcome::SomeFailed
            } else {
                TaskOutcome::AllSucceeded
            })
        }
    }

    fn build(name: &str, version: &str, release: &str) -> BuildInfo {
        BuildInfo {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
        }
    }

    #[test]
    fn test_ensure_tagged_skips_existing() {
        let tracker = MockTracker {
            tagged: vec![("ceph-3.2-xenial".to_string(), "ceph-12.2.8-1xenial".to_string())],
            ..Default::default()
        };
        let info = build("ceph", "12.2.8", "1xenial");
        let tags = BTreeSet::from(["ceph-3.2-xenial".to_string()]);

        ensure_tagged(&tracker, &info, &tags, false).unwrap();
        assert!(tracker.tag_calls.borrow().is_empty());
    }

    #[test]
    fn test_ensure_tagged_issues_missing_tags() {
        let tracker = MockTracker::default();
        let info = build("ceph", "12.2.8", "1xenial");
        let tags = BTreeSet::from([
            "ceph-3.2-xenial".to_string(),
            "ceph-3.2-bionic".to_string(),
        ]);

        ensure_tagged(&tracker, &info, &tags, false).unwrap();
        let calls = tracker.tag_calls.borrow();
        // Sorted tag order.
        assert_eq!(calls[0].0, "ceph-3.2-bionic");
        assert_eq!(calls[1].0, "ceph-3.2-xenial");
        assert_eq!(calls[0].1, "ceph-12.2.8-1xenial");
    }

    #[test]
    fn test_ensure_tagged_reports_failed_tasks() {
        let tracker = MockTracker {
            fail_tasks: true,
            ..Default::default()
        };
        let info = build("ceph", "12.2.8", "1xenial");
        let tags = BTreeSet::from(["ceph-3.2-xenial".to_string()]);

        assert!(matches!(
            ensure_tagged(&tracker, &info, &tags, false),
            Err(Error::TaggingFailed(_))
        ));
    }

    #[test]
    fn test_ensure_tagged_dryrun_is_silent() {
        let tracker = MockTracker {
            fail_tasks: true, // would fail if anything were watched
            ..Default::default()
        };
        let info = build("ceph", "12.2.8", "1xenial");
        let tags = BTreeSet::from(["ceph-3.2-xenial".to_string()]);

        ensure_tagged(&tracker, &info, &tags, true).unwrap();
        assert!(tracker.tag_calls.borrow().is_empty());
    }
}
