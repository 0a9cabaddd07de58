// src/error.rs

//! Crate-wide error type and result alias
//!
//! One error enum covers the whole sync pipeline so that callers can
//! distinguish "skip this build and continue" conditions from hard
//! failures without string-matching messages.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// NVR string did not contain a `_` between name and version
    #[error("malformed build identifier: {0}")]
    MalformedIdentifier(String),

    /// Manifest filename did not match the builds-*.txt naming convention
    #[error("unrecognized manifest name: {0}")]
    UnrecognizedManifestName(String),

    /// No known distribution codename in a manifest filename suffix
    #[error("no known distribution in {0}")]
    UnknownDistribution(String),

    /// Expected exactly one file with an extension, found none
    #[error("no files found: {0}")]
    NoFilesFound(String),

    /// Expected exactly one file with an extension, found several
    #[error("multiple files found: {0}")]
    MultipleFilesFound(String),

    /// A fetched file's checksum did not match its declared checksum
    #[error("checksum mismatch on {0}")]
    ChecksumMismatch(String),

    /// A file referenced by a source descriptor is absent
    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    /// Build log contained an unexpected number of timestamp markers
    #[error("corrupt build log: {0}")]
    CorruptLog(String),

    /// One or more tagging tasks did not reach success
    #[error("failed to tag build {0}")]
    TaggingFailed(String),

    /// Network or HTTP failure from the store or the tracker
    #[error("transport error: {0}")]
    Transport(String),

    /// User or tag missing from the tracker during preflight
    #[error("not found in tracker: {0}")]
    NotFound(String),

    /// The tracker rejected a content-generator import
    #[error("import failed: {0}")]
    ImportFailed(String),

    /// Control-file or payload parsing failure
    #[error("parse error: {0}")]
    Parse(String),

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Prefix the detail string with extra context, keeping the variant
    ///
    /// Lets callers attach which build a file-cardinality problem belongs
    /// to without collapsing the error kind.
    pub fn with_context(self, context: &str) -> Error {
        match self {
            Error::NoFilesFound(detail) => Error::NoFilesFound(format!("{context}: {detail}")),
            Error::MultipleFilesFound(detail) => {
                Error::MultipleFilesFound(format!("{context}: {detail}"))
            }
            Error::MissingArtifact(detail) => {
                Error::MissingArtifact(format!("{context}: {detail}"))
            }
            other => other,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
