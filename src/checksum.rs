// src/checksum.rs

//! Streaming checksum helpers
//!
//! Two digests are in play: the tracker's metadata format only accepts
//! md5, while the source store declares sha512 for every hosted binary.
//! Both are computed in fixed-size chunks so large artifacts never sit in
//! memory whole.

use crate::error::Result;
use md5::Md5;
use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read buffer size for digest computation
const CHUNK_SIZE: usize = 8192;

fn hex_digest<D: Digest>(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex md5 digest of a file
pub fn md5_hex(path: &Path) -> Result<String> {
    hex_digest::<Md5>(path)
}

/// Hex sha512 digest of a file
pub fn sha512_hex(path: &Path) -> Result<String> {
    hex_digest::<Sha512>(path)
}

/// Check a local file against the store's declared sha512
pub fn sha512_matches(path: &Path, expected: &str) -> Result<bool> {
    Ok(sha512_hex(path)?.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_md5_known_value() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world\n").unwrap();
        assert_eq!(md5_hex(f.path()).unwrap(), "6f5902ac237024bdd0c176cb93063dc4");
    }

    #[test]
    fn test_sha512_matches_is_case_insensitive() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"abc").unwrap();
        let digest = sha512_hex(f.path()).unwrap();
        assert!(sha512_matches(f.path(), &digest.to_uppercase()).unwrap());
        assert!(!sha512_matches(f.path(), "deadbeef").unwrap());
    }
}
