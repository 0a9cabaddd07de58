// src/import.rs

//! Content-generator import of one build
//!
//! Turns a directory of fetched artifacts into the tracker's provenance
//! record: build block, one synthetic buildroot, and one output entry per
//! artifact, serialized as `metadata.json` and imported in a single
//! `CGImport` call after staging every file. `ensure_uploaded` wraps this
//! in the idempotence check: a build the tracker already knows is
//! returned untouched, never re-imported.

use crate::control::Control;
use crate::error::{Error, Result};
use crate::locator::ArtifactSource;
use crate::nvr::Nvr;
use crate::tracker::{self, BuildInfo, TrackerSession};
use crate::{checksum, verify};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Marker line prefix for build start/end times in a pbuilder log
const TIME_STAMP_PREFIX: &str = "I: pbuilder-time-stamp: ";

/// Architecture recorded for imported artifacts
///
/// The store's `all` listing does not preserve per-binary architectures,
/// so imports record the build host architecture throughout, as the
/// original composes did.
const ARTIFACT_ARCH: &str = "x86_64";

/// How one import should run
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Tracker user that will own the build
    pub owner: String,
    /// Source-control URL recorded in the provenance record
    pub scm_url: String,
    /// Tolerate a missing build log (and missing `.changes` alongside one)
    pub skip_log: bool,
    /// Log intended actions without mutating anything
    pub dryrun: bool,
}

/// The `build` block of the provenance record
#[derive(Debug, Clone, Serialize)]
pub struct BuildRecord {
    pub name: String,
    pub version: String,
    pub release: String,
    pub source: String,
    pub start_time: i64,
    pub end_time: i64,
    pub owner: String,
    pub extra: serde_json::Value,
}

/// One output-file entry of the provenance record
#[derive(Debug, Clone, Serialize)]
pub struct OutputFile {
    pub buildroot_id: u32,
    pub filename: String,
    pub filesize: u64,
    pub checksum_type: String,
    pub checksum: String,
    pub arch: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub extra: serde_json::Value,
}

fn debian_typeinfo() -> serde_json::Value {
    json!({ "typeinfo": { "debian": {} } })
}

/// Artifact kind from a filename extension
fn artifact_kind(filename: &str) -> Result<&'static str> {
    if filename.ends_with(".tar.gz") || filename.ends_with(".tar.xz") {
        Ok("tarball")
    } else if filename.ends_with(".deb") {
        Ok("deb")
    } else if filename.ends_with(".dsc") {
        Ok("dsc")
    } else if filename.ends_with(".log") {
        Ok("log")
    } else {
        Err(Error::Parse(format!("unknown extension for {filename}")))
    }
}

/// Find exactly one `*.{extension}` file in a directory
pub fn find_one_file(dir: &Path, extension: &str) -> Result<PathBuf> {
    let suffix = format!(".{extension}");
    let mut matches: Vec<PathBuf> = crate::locator::list_files(dir)?
        .into_iter()
        .filter(|p| p.to_string_lossy().ends_with(&suffix))
        .collect();
    match matches.len() {
        0 => Err(Error::NoFilesFound(format!(
            "could not find a .{extension} file in {}",
            dir.display()
        ))),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::MultipleFilesFound(format!(
            "multiple .{extension} files in {}",
            dir.display()
        ))),
    }
}

/// All `*.deb` files in a directory
pub fn find_deb_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(crate::locator::list_files(dir)?
        .into_iter()
        .filter(|p| p.to_string_lossy().ends_with(".deb"))
        .collect())
}

/// Copy a `.build` log to `.log` so the tracker's extension check accepts it
fn rename_log_file(log_file: &Path) -> Result<PathBuf> {
    let stem = log_file
        .to_string_lossy()
        .strip_suffix(".build")
        .map(str::to_string)
        .ok_or_else(|| Error::Io(format!("not a .build file: {}", log_file.display())))?;
    let new_log_file = PathBuf::from(format!("{stem}.log"));
    fs::copy(log_file, &new_log_file)
        .map_err(|e| Error::Io(format!("copying {}: {e}", log_file.display())))?;
    Ok(new_log_file)
}

/// Start and end times from a pbuilder log
///
/// The first `pbuilder-time-stamp` marker is the start, the second the
/// end; a third marker, or fewer than two, mean the log cannot be
/// trusted and the whole import fails with [`Error::CorruptLog`].
pub fn build_times_from_log(log_file: &Path) -> Result<(i64, i64)> {
    let content = fs::read_to_string(log_file)
        .map_err(|e| Error::Io(format!("reading {}: {e}", log_file.display())))?;
    let mut start_time = None;
    let mut end_time = None;
    for line in content.lines() {
        let Some(rest) = line.strip_prefix(TIME_STAMP_PREFIX) else {
            continue;
        };
        let timestamp = rest
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::CorruptLog(format!("{}: {e}", log_file.display())))?;
        if start_time.is_none() {
            start_time = Some(timestamp);
        } else if end_time.is_none() {
            end_time = Some(timestamp);
        } else {
            return Err(Error::CorruptLog(format!(
                "too many pbuilder-time-stamp lines in {}",
                log_file.display()
            )));
        }
    }
    match (start_time, end_time) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(Error::CorruptLog(format!(
            "missing pbuilder-time-stamp lines in {}",
            log_file.display()
        ))),
    }
}

/// Provenance metadata for one artifact
fn file_info(path: &Path) -> Result<OutputFile> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::Io(format!("no filename in {}", path.display())))?;
    let filesize = fs::metadata(path)
        .map_err(|e| Error::Io(format!("stat {}: {e}", path.display())))?
        .len();
    Ok(OutputFile {
        buildroot_id: 0,
        filename: filename.clone(),
        filesize,
        // The tracker only supports md5 for content-generator output.
        checksum_type: "md5".to_string(),
        checksum: checksum::md5_hex(path)?,
        arch: ARTIFACT_ARCH.to_string(),
        kind: artifact_kind(&filename)?.to_string(),
        extra: debian_typeinfo(),
    })
}

/// The single synthetic buildroot every imported build references
fn buildroots() -> serde_json::Value {
    json!([{
        "id": 0,
        "host": { "arch": ARTIFACT_ARCH, "os": "Ubuntu" },
        "content_generator": { "name": "debian", "version": "1" },
        "container": { "type": "pbuilder", "arch": ARTIFACT_ARCH },
        "tools": [],
        "components": [],
    }])
}

/// Assemble the full provenance document
fn metadata_document(build: &BuildRecord, output: &[OutputFile]) -> serde_json::Value {
    json!({
        "metadata_version": 0,
        "build": build,
        "buildroots": buildroots(),
        "output": output,
    })
}

/// Import the build artifacts in `dir` into the tracker
///
/// Verifies the artifact set against its source descriptor, derives build
/// times, writes `metadata.json` next to the artifacts, stages everything
/// under a unique remote path, and issues one `CGImport`.
pub fn import_from_directory(
    session: &dyn TrackerSession,
    dir: &Path,
    opts: &ImportOptions,
) -> Result<BuildInfo> {
    let dsc_file = find_one_file(dir, "dsc")?;
    let dsc = Control::from_path(&dsc_file)?;
    let source_files = verify::verify_sources(&dsc, dir)?;
    let deb_files = find_deb_files(dir)?;

    let log_file = match find_one_file(dir, "build") {
        Ok(path) => Some(path),
        Err(Error::NoFilesFound(_)) if opts.skip_log => None,
        Err(e) => return Err(e),
    };
    let changes_file = match find_one_file(dir, "changes") {
        Ok(path) => Some(path),
        Err(Error::NoFilesFound(_)) if opts.skip_log && log_file.is_some() => None,
        Err(e) => return Err(e),
    };

    let (start_time, end_time) = match (&log_file, &changes_file) {
        (Some(log), _) => build_times_from_log(log)?,
        (None, Some(changes)) => {
            // Accepted precision loss: without a log the change manifest's
            // single timestamp stands in for both ends of the build.
            let epoch = Control::from_path(changes)?.date_epoch()?;
            warn!(
                "{}: no build log, recording zero-duration build from .changes time",
                dir.display()
            );
            (epoch, epoch)
        }
        (None, None) => {
            return Err(Error::NoFilesFound(format!(
                "neither a .build log nor a .changes file in {}",
                dir.display()
            )));
        }
    };

    let name = dsc.source()?.to_string();
    let (version, release) = dsc.version_release()?;

    // Everything up to here is read-only verification; a dry run stops
    // before the log copy and metadata write touch the directory.
    if opts.dryrun {
        info!("would import {}-{}-{} from {}", name, version, release, dir.display());
        return Ok(BuildInfo { name, version, release });
    }

    let build = BuildRecord {
        name,
        version,
        release,
        source: opts.scm_url.clone(),
        start_time,
        end_time,
        owner: opts.owner.clone(),
        extra: debian_typeinfo(),
    };

    let mut all_files = vec![dsc_file];
    all_files.extend(source_files);
    all_files.extend(deb_files);
    if let Some(log) = &log_file {
        all_files.push(rename_log_file(log)?);
    }
    all_files.sort();
    all_files.dedup();

    let output: Vec<OutputFile> = all_files
        .iter()
        .map(|path| file_info(path))
        .collect::<Result<_>>()?;
    let metadata = metadata_document(&build, &output);

    let metadata_path = dir.join("metadata.json");
    fs::write(&metadata_path, serde_json::to_vec(&metadata)?)
        .map_err(|e| Error::Io(format!("writing {}: {e}", metadata_path.display())))?;

    let remote_dir = tracker::unique_staging_path();
    info!("uploading files to {}", remote_dir);
    all_files.push(metadata_path);
    for path in &all_files {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::Io(format!("no filename in {}", path.display())))?;
        session.upload(path, &format!("{remote_dir}/{basename}"))?;
    }

    let buildinfo = session.cg_import(&metadata, &remote_dir)?;
    info!("imported {}", buildinfo.nvr());
    Ok(buildinfo)
}

/// Ensure a build exists in the tracker, importing it if necessary
///
/// Returns the existing build untouched when the tracker already has the
/// key, making re-runs free of duplicate imports. In dry-run mode returns
/// `None` for builds that would have been fetched.
pub fn ensure_uploaded(
    session: &dyn TrackerSession,
    source: &dyn ArtifactSource,
    nvr: &Nvr,
    scm_template: &str,
    owner: &str,
    dryrun: bool,
) -> Result<Option<BuildInfo>> {
    let key = nvr.tracker_key();
    if let Some(buildinfo) = session.get_build(&key)? {
        info!("{} already imported as {}", nvr, buildinfo.nvr());
        return Ok(Some(buildinfo));
    }
    if dryrun {
        info!("would download build {}", nvr);
        return Ok(None);
    }
    let dir = source.fetch_build(nvr)?;
    let opts = ImportOptions {
        owner: owner.to_string(),
        scm_url: scm_template.replace("{name}", nvr.name()),
        skip_log: true,
        dryrun,
    };
    import_from_directory(session, &dir, &opts).map(Some)
}
