// src/store.rs

//! HTTP client for the source store
//!
//! The store hosts built artifacts under
//! `binaries/<pkg>/<version>/ubuntu/<distro-or-all>/<arch>/<file>`, with a
//! JSON listing at each level. Idempotent GETs are retried with a short
//! backoff; downloads stream to disk and skip files whose sha512 already
//! matches the store's declared checksum, so an interrupted fetch resumes
//! where it left off.

use crate::checksum;
use crate::error::{Error, Result};
use crate::locator::ArtifactSource;
use crate::nvr::Nvr;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for idempotent GETs
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds, scaled by attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Per-file metadata from an architecture listing
#[derive(Debug, Clone, Deserialize)]
pub struct BinaryMeta {
    pub checksum: String,
}

/// Client for one source-store instance
pub struct StoreClient {
    client: Client,
    base_url: String,
    downloads_dir: PathBuf,
    max_retries: u32,
}

impl StoreClient {
    /// Create a client for `base_url`, caching downloads under `downloads/`
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_downloads_dir(base_url, "downloads")
    }

    pub fn with_downloads_dir(base_url: &str, downloads_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            downloads_dir: downloads_dir.into(),
            max_retries: MAX_RETRIES,
        })
    }

    /// Base listing URL for a build: `binaries/<pkg>/<version>/ubuntu/all`
    pub fn build_url(&self, nvr: &Nvr) -> String {
        format!(
            "{}/binaries/{}/{}/ubuntu/all",
            self.base_url,
            nvr.name(),
            nvr.full_version()
        )
    }

    /// GET with bounded retry; only used for idempotent reads
    fn get_with_retry(&self, url: &str) -> Result<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Transport(format!(
                            "GET {url} failed after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("GET {} attempt {} failed: {}, retrying...", url, attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    fn check_status(url: &str, response: Response) -> Result<Response> {
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }
        Ok(response)
    }

    /// Architectures and their file lists for a build
    pub fn list_build(&self, nvr: &Nvr) -> Result<BTreeMap<String, Vec<String>>> {
        let url = self.build_url(nvr);
        info!("searching {} for builds", url);
        let response = Self::check_status(&url, self.get_with_retry(&url)?)?;
        response
            .json()
            .map_err(|e| Error::Parse(format!("bad build listing from {url}: {e}")))
    }

    /// Filename → metadata for one architecture of a build
    pub fn arch_metadata(&self, nvr: &Nvr, arch: &str) -> Result<BTreeMap<String, BinaryMeta>> {
        let url = format!("{}/{}", self.build_url(nvr), arch);
        let response = Self::check_status(&url, self.get_with_retry(&url)?)?;
        response
            .json()
            .map_err(|e| Error::Parse(format!("bad metadata from {url}: {e}")))
    }

    /// Names of the build's source files, per the store's `source` listing
    ///
    /// A 404 means the build has no source files at all, reported as
    /// [`Error::NoFilesFound`] rather than a transport failure.
    pub fn source_filenames(&self, nvr: &Nvr) -> Result<BTreeSet<String>> {
        let url = format!("{}/source", self.build_url(nvr));
        debug!("searching {} for files", url);
        let response = self.get_with_retry(&url)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NoFilesFound(format!("{nvr} has no source files")));
        }
        let response = Self::check_status(&url, response)?;
        let payload: serde_json::Value = response
            .json()
            .map_err(|e| Error::Parse(format!("bad source listing from {url}: {e}")))?;
        // The listing is a filename->metadata object on current stores and
        // a bare array on older ones.
        let names = match payload {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            serde_json::Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            other => {
                return Err(Error::Parse(format!(
                    "unexpected source listing from {url}: {other}"
                )));
            }
        };
        Ok(names)
    }

    /// Fetch one of the build's source files as text (`.dsc`, `.changes`)
    pub fn fetch_source_text(&self, nvr: &Nvr, filename: &str) -> Result<String> {
        let url = format!("{}/source/{}/", self.build_url(nvr), filename);
        let response = Self::check_status(&url, self.get_with_retry(&url)?)?;
        response
            .text()
            .map_err(|e| Error::Transport(format!("reading {url}: {e}")))
    }

    /// Download every artifact of a build into `downloads/<nvr>/`
    ///
    /// Files already on disk with a matching sha512 are skipped; a
    /// mismatched file is re-downloaded.
    pub fn download_build(&self, nvr: &Nvr) -> Result<PathBuf> {
        let dest_dir = self.downloads_dir.join(nvr.to_string());
        fs::create_dir_all(&dest_dir)
            .map_err(|e| Error::Io(format!("creating {}: {e}", dest_dir.display())))?;

        let archs = self.list_build(nvr)?;
        for (arch, binaries) in archs {
            let metadata = self.arch_metadata(nvr, &arch)?;
            for binary in binaries {
                let output_path = dest_dir.join(&binary);
                if output_path.is_file() {
                    match metadata.get(&binary) {
                        Some(meta) if checksum::sha512_matches(&output_path, &meta.checksum)? => {
                            info!("skipping {}", binary);
                            continue;
                        }
                        Some(_) => warn!("checksum mismatch on {}, re-downloading", binary),
                        None => warn!("{} not in store metadata, re-downloading", binary),
                    }
                }
                info!("downloading {}", binary);
                let url = format!("{}/{}/{}/", self.build_url(nvr), arch, binary);
                self.download_file(&url, &output_path)?;
                if let Some(meta) = metadata.get(&binary) {
                    if !checksum::sha512_matches(&output_path, &meta.checksum)? {
                        let _ = fs::remove_file(&output_path);
                        return Err(Error::ChecksumMismatch(output_path.display().to_string()));
                    }
                }
            }
        }
        Ok(dest_dir)
    }

    /// Stream a URL to a file, writing through a temp path
    fn download_file(&self, url: &str, dest_path: &Path) -> Result<()> {
        let mut response = Self::check_status(url, self.get_with_retry(url)?)?;
        let temp_path = dest_path.with_extension("tmp");
        let mut file = File::create(&temp_path)
            .map_err(|e| Error::Io(format!("creating {}: {e}", temp_path.display())))?;
        io::copy(&mut response, &mut file)
            .map_err(|e| Error::Io(format!("writing {}: {e}", temp_path.display())))?;
        fs::rename(&temp_path, dest_path).map_err(|e| {
            Error::Io(format!(
                "moving {} to {}: {e}",
                temp_path.display(),
                dest_path.display()
            ))
        })?;
        Ok(())
    }
}

impl ArtifactSource for StoreClient {
    fn fetch_build(&self, nvr: &Nvr) -> Result<PathBuf> {
        self.download_build(nvr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_layout() {
        let store = StoreClient::new("https://store.example.com/").unwrap();
        let nvr = Nvr::parse("ceph_12.2.8-1xenial").unwrap();
        assert_eq!(
            store.build_url(&nvr),
            "https://store.example.com/binaries/ceph/12.2.8-1xenial/ubuntu/all"
        );
    }
}
