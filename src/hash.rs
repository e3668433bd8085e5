// src/hash.rs

//! SHA-256 checksums for downloaded files
//!
//! Checksums are written as `algorithm:hex`, e.g. `sha256:9f86d0...`.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Supported checksum algorithm prefix
pub const SHA256_PREFIX: &str = "sha256:";

/// Hash a reader with SHA-256 and return the lowercase hex digest
pub fn sha256_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file with SHA-256
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
    sha256_reader(file)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))
}

/// Check that a checksum string is well formed
pub fn parse_checksum(expected: &str) -> Result<&str> {
    let digest = expected.strip_prefix(SHA256_PREFIX).ok_or_else(|| {
        Error::ParseError(format!(
            "Invalid checksum format: {}. Expected sha256:...",
            expected
        ))
    })?;

    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::ParseError(format!(
            "Invalid sha256 digest '{}': expected 64 hex digits",
            digest
        )));
    }

    Ok(digest)
}

/// Verify a file against an expected `sha256:<hex>` checksum
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let digest = parse_checksum(expected)?;
    let actual = sha256_file(path)?;

    if !actual.eq_ignore_ascii_case(digest) {
        return Err(Error::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual: format!("{}{}", SHA256_PREFIX, actual),
        });
    }

    Ok(())
}
