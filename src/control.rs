// src/control.rs

//! Debian control-file parsing (`.dsc` and `.changes`)
//!
//! A minimal RFC 822-style paragraph parser: `Field: value` lines with
//! indented continuation lines, enough to read the source descriptor and
//! change-manifest files a build ships with. Clearsigned files have their
//! PGP armor stripped before parsing.

use crate::error::{Error, Result};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One file entry from a `Files:` field: md5, size, filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub md5sum: String,
    pub size: u64,
    pub name: String,
}

/// A parsed control paragraph with case-insensitive field lookup
#[derive(Debug, Clone, Default)]
pub struct Control {
    fields: BTreeMap<String, String>,
}

impl Control {
    /// Parse the first paragraph of a control file
    pub fn parse(content: &str) -> Result<Self> {
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        let mut current: Option<String> = None;

        for line in strip_pgp_armor(content).lines() {
            if line.trim().is_empty() {
                if !fields.is_empty() {
                    break; // end of first paragraph
                }
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                let key = current
                    .as_ref()
                    .ok_or_else(|| Error::Parse(format!("continuation without field: {line:?}")))?;
                let value = fields
                    .get_mut(key)
                    .ok_or_else(|| Error::Parse(format!("continuation without field: {line:?}")))?;
                value.push('\n');
                value.push_str(line.trim());
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Parse(format!("malformed control line: {line:?}")))?;
            let key = key.trim().to_lowercase();
            fields.insert(key.clone(), value.trim().to_string());
            current = Some(key);
        }

        if fields.is_empty() {
            return Err(Error::Parse("empty control file".to_string()));
        }
        Ok(Self { fields })
    }

    /// Parse a control file from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("reading {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Field lookup, case-insensitive
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(&field.to_lowercase()).map(String::as_str)
    }

    fn require(&self, field: &str) -> Result<&str> {
        self.get(field)
            .ok_or_else(|| Error::Parse(format!("control file has no {field} field")))
    }

    /// The `Files:` list: one `<md5> <size> [...] <name>` entry per line
    ///
    /// `.changes` entries carry extra section/priority columns between
    /// size and name; the filename is always the last column.
    pub fn files(&self) -> Result<Vec<FileEntry>> {
        let raw = self.require("files")?;
        let mut entries = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 3 {
                return Err(Error::Parse(format!("malformed Files entry: {line:?}")));
            }
            let size = columns[1]
                .parse::<u64>()
                .map_err(|e| Error::Parse(format!("bad size in Files entry {line:?}: {e}")))?;
            entries.push(FileEntry {
                md5sum: columns[0].to_string(),
                size,
                name: columns[columns.len() - 1].to_string(),
            });
        }
        Ok(entries)
    }

    /// `Source:` field of a `.dsc`
    pub fn source(&self) -> Result<&str> {
        self.require("source")
    }

    /// Upstream version and Debian revision from the `Version:` field
    ///
    /// Split on the last `-`; a revision-less version gets `"0"`, matching
    /// the NVR convention.
    pub fn version_release(&self) -> Result<(String, String)> {
        let version = self.require("version")?;
        match version.rsplit_once('-') {
            Some((v, r)) => Ok((v.to_string(), r.to_string())),
            None => Ok((version.to_string(), "0".to_string())),
        }
    }

    /// `Date:` field of a `.changes` file as epoch seconds
    pub fn date_epoch(&self) -> Result<i64> {
        let date = self.require("date")?;
        let parsed = DateTime::parse_from_rfc2822(date)
            .map_err(|e| Error::Parse(format!("bad Date field {date:?}: {e}")))?;
        Ok(parsed.timestamp())
    }
}

/// Drop the clearsign wrapper from a signed control file, if present
fn strip_pgp_armor(content: &str) -> &str {
    let Some(start) = content.find("-----BEGIN PGP SIGNED MESSAGE-----") else {
        return content;
    };
    // The signed body starts after the hash headers and their blank line.
    let body = &content[start..];
    let body_start = body.find("\n\n").map(|i| start + i + 2).unwrap_or(start);
    let body_end = content
        .find("-----BEGIN PGP SIGNATURE-----")
        .unwrap_or(content.len());
    &content[body_start..body_end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSC: &str = "\
Format: 3.0 (quilt)
Source: ceph
Version: 12.2.8-1xenial
Files:
 d41d8cd98f00b204e9800998ecf8427e 1024 ceph_12.2.8.orig.tar.gz
 900150983cd24fb0d6963f7d28e17f72 512 ceph_12.2.8-1xenial.debian.tar.xz
";

    const CHANGES: &str = "\
Source: ceph
Version: 12.2.8-1xenial
Date: Thu, 21 Feb 2019 11:00:00 +0000
Files:
 d41d8cd98f00b204e9800998ecf8427e 1024 admin optional ceph_12.2.8.orig.tar.gz
";

    #[test]
    fn test_parse_dsc_fields() {
        let dsc = Control::parse(DSC).unwrap();
        assert_eq!(dsc.source().unwrap(), "ceph");
        let (version, release) = dsc.version_release().unwrap();
        assert_eq!(version, "12.2.8");
        assert_eq!(release, "1xenial");
    }

    #[test]
    fn test_files_list() {
        let dsc = Control::parse(DSC).unwrap();
        let files = dsc.files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "ceph_12.2.8.orig.tar.gz");
        assert_eq!(files[0].size, 1024);
        assert_eq!(files[0].md5sum, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_continuation_lines_join() {
        let control = Control::parse(
            "Source: ceph\nDescription: first line\n second line\n\tthird line\n",
        )
        .unwrap();
        assert_eq!(
            control.get("description").unwrap(),
            "first line\nsecond line\nthird line"
        );
    }

    #[test]
    fn test_changes_files_use_last_column() {
        let changes = Control::parse(CHANGES).unwrap();
        let files = changes.files().unwrap();
        assert_eq!(files[0].name, "ceph_12.2.8.orig.tar.gz");
    }

    #[test]
    fn test_changes_date_epoch() {
        let changes = Control::parse(CHANGES).unwrap();
        assert_eq!(changes.date_epoch().unwrap(), 1_550_746_800);
    }

    #[test]
    fn test_version_without_revision() {
        let control = Control::parse("Source: native\nVersion: 1.4\n").unwrap();
        let (version, release) = control.version_release().unwrap();
        assert_eq!(version, "1.4");
        assert_eq!(release, "0");
    }

    #[test]
    fn test_clearsigned_dsc() {
        let signed = format!(
            "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\n{DSC}\
             -----BEGIN PGP SIGNATURE-----\nnoise\n-----END PGP SIGNATURE-----\n"
        );
        let dsc = Control::parse(&signed).unwrap();
        assert_eq!(dsc.source().unwrap(), "ceph");
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(Control::parse("").is_err());
        assert!(Control::parse("\n\n").is_err());
    }
}
