// src/lib.rs

//! Debsync
//!
//! Migrates Debian package builds out of a content-addressed artifact
//! store and into a build tracker, then keeps them tagged into the right
//! release channels. Both phases are idempotent: a build the tracker
//! already knows is never re-imported, a tag already applied is never
//! re-requested, so interrupted runs simply converge on the next attempt.
//!
//! # Architecture
//!
//! - NVR-first: builds are identified by `name_version-release` strings
//!   and processed in full Debian version order
//! - Manifest-driven: `builds-*.txt` file names encode the release tags
//! - Two-phase per build: content-generator import, then tag sync
//! - Explicit sessions: the tracker is a trait handle threaded through
//!   every operation, never ambient state

pub mod checksum;
pub mod control;
mod error;
pub mod import;
pub mod locator;
pub mod manifest;
pub mod missing;
pub mod nvr;
pub mod store;
pub mod sync;
pub mod tags;
pub mod tracker;
pub mod verify;

pub use error::{Error, Result};
pub use import::{ensure_uploaded, import_from_directory, ImportOptions};
pub use locator::{ArtifactSource, LocalTree};
pub use nvr::{deb_version_cmp, Nvr};
pub use store::StoreClient;
pub use sync::{ensure_tagged, SyncOptions, SyncReport};
pub use tags::TagRules;
pub use tracker::{BuildInfo, HttpTracker, TrackerSession};
