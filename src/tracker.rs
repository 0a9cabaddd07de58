// src/tracker.rs

//! Build-tracker session
//!
//! The tracker is an external build database with a small RPC surface:
//! build lookup, user/tag lookup, tag listings, artifact upload,
//! content-generator import, and asynchronous tag tasks. The session is a
//! trait so the sync engine is testable against a fake, and so no code
//! reaches for ambient global state; every operation takes the session it
//! talks through.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for tracker RPC calls (5 minutes; uploads are slow)
const RPC_TIMEOUT: Duration = Duration::from_secs(300);

/// Poll interval while waiting on tag tasks
pub const TASK_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Identifier of an asynchronous tracker task
pub type TaskId = u64;

/// A build as the tracker reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub name: String,
    pub version: String,
    pub release: String,
}

impl BuildInfo {
    /// The tracker-side `name-version-release` rendering of this build
    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }
}

/// A tracker user account
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub name: String,
}

/// A tracker tag
#[derive(Debug, Clone, Deserialize)]
pub struct TagInfo {
    pub name: String,
}

/// Terminal state of a watched task batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    AllSucceeded,
    SomeFailed,
}

/// RPC session with the build tracker
pub trait TrackerSession {
    /// Look up a build by key; `None` when the tracker has no such build
    fn get_build(&self, key: &str) -> Result<Option<BuildInfo>>;

    /// Look up a user account by name
    fn get_user(&self, name: &str) -> Result<Option<UserInfo>>;

    /// Look up a tag by name
    fn get_tag(&self, name: &str) -> Result<Option<TagInfo>>;

    /// Builds of `package` and `build_type` currently tagged into `tag`
    fn list_tagged(&self, tag: &str, package: &str, build_type: &str) -> Result<Vec<BuildInfo>>;

    /// Upload one local file to a staging path on the tracker
    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Content-generator import referencing a staging directory
    ///
    /// Write-once on the tracker side; metadata inconsistencies are
    /// rejected there and surface as [`Error::ImportFailed`].
    fn cg_import(&self, metadata: &serde_json::Value, remote_dir: &str) -> Result<BuildInfo>;

    /// Request tagging of `nvr` into `tag`; returns the async task id
    fn tag_build(&self, tag: &str, nvr: &str) -> Result<TaskId>;

    /// Block until every task reaches a terminal state
    fn watch_tasks(&self, task_ids: &[TaskId]) -> Result<TaskOutcome>;
}

/// Verify that a user exists in the tracker before importing under them
pub fn verify_user(session: &dyn TrackerSession, username: &str) -> Result<UserInfo> {
    session
        .get_user(username)?
        .ok_or_else(|| Error::NotFound(format!("user {username}")))
}

/// Verify that a tag exists in the tracker
pub fn verify_tag(session: &dyn TrackerSession, tag: &str) -> Result<TagInfo> {
    session
        .get_tag(tag)?
        .ok_or_else(|| Error::NotFound(format!("tag {tag}")))
}

/// A unique staging directory name for one import
pub fn unique_staging_path() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "cli-import/{}-{}-{}",
        chrono::Utc::now().timestamp(),
        std::process::id(),
        seq
    )
}

/// Tracker session over the hub's HTTP gateway
///
/// Method calls POST `{"method": ..., "params": [...]}` to the hub and
/// read `{"result": ...}` back; uploads PUT raw bytes to the staging
/// path. Mutating calls are never retried here, so a flaky network cannot
/// cause duplicate side effects.
pub struct HttpTracker {
    client: Client,
    hub_url: String,
    task_poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct RpcReply<T> {
    result: Option<T>,
    error: Option<String>,
}

impl HttpTracker {
    pub fn new(hub_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            hub_url: hub_url.trim_end_matches('/').to_string(),
            task_poll_interval: TASK_POLL_INTERVAL,
        })
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<Option<T>> {
        debug!("tracker call {} {}", method, params);
        let response = self
            .client
            .post(&self.hub_url)
            .json(&json!({ "method": method, "params": params }))
            .send()
            .map_err(|e| Error::Transport(format!("{method} call failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "HTTP {} from {} calling {method}",
                response.status(),
                self.hub_url
            )));
        }
        let reply: RpcReply<T> = response
            .json()
            .map_err(|e| Error::Parse(format!("bad {method} reply: {e}")))?;
        if let Some(message) = reply.error {
            return Err(Error::Transport(format!("{method}: {message}")));
        }
        Ok(reply.result)
    }
}

impl TrackerSession for HttpTracker {
    fn get_build(&self, key: &str) -> Result<Option<BuildInfo>> {
        self.call("getBuild", json!([key]))
    }

    fn get_user(&self, name: &str) -> Result<Option<UserInfo>> {
        self.call("getUser", json!([name]))
    }

    fn get_tag(&self, name: &str) -> Result<Option<TagInfo>> {
        self.call("getTag", json!([name]))
    }

    fn list_tagged(&self, tag: &str, package: &str, build_type: &str) -> Result<Vec<BuildInfo>> {
        let tagged: Option<Vec<BuildInfo>> =
            self.call("listTagged", json!([tag, package, build_type]))?;
        Ok(tagged.unwrap_or_default())
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        info!("uploading {} to {}", local_path.display(), remote_path);
        let file = File::open(local_path)
            .map_err(|e| Error::Io(format!("opening {}: {e}", local_path.display())))?;
        let response = self
            .client
            .put(format!("{}/upload/{}", self.hub_url, remote_path))
            .body(file)
            .send()
            .map_err(|e| Error::Transport(format!("upload failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "HTTP {} uploading {}",
                response.status(),
                remote_path
            )));
        }
        Ok(())
    }

    fn cg_import(&self, metadata: &serde_json::Value, remote_dir: &str) -> Result<BuildInfo> {
        let imported: Option<BuildInfo> =
            self.call("CGImport", json!([metadata, remote_dir]))?;
        imported.ok_or_else(|| Error::ImportFailed(format!("CGImport of {remote_dir} returned nothing")))
    }

    fn tag_build(&self, tag: &str, nvr: &str) -> Result<TaskId> {
        let task: Option<TaskId> = self.call("tagBuild", json!([tag, nvr]))?;
        task.ok_or_else(|| Error::TaggingFailed(format!("{nvr}: no task id from tagBuild")))
    }

    fn watch_tasks(&self, task_ids: &[TaskId]) -> Result<TaskOutcome> {
        let mut pending: Vec<TaskId> = task_ids.to_vec();
        let mut failed = false;
        while !pending.is_empty() {
            let mut still_pending = Vec::new();
            for task_id in pending {
                let state: Option<String> = self.call("taskState", json!([task_id]))?;
                match state.as_deref() {
                    Some("closed") => debug!("task {} closed", task_id),
                    Some("failed") | Some("canceled") => {
                        info!("task {} did not succeed", task_id);
                        failed = true;
                    }
                    _ => still_pending.push(task_id),
                }
            }
            pending = still_pending;
            if !pending.is_empty() {
                std::thread::sleep(self.task_poll_interval);
            }
        }
        Ok(if failed {
            TaskOutcome::SomeFailed
        } else {
            TaskOutcome::AllSucceeded
        })
    }
}
