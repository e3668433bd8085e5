// src/repository/client.rs

//! HTTP client for key servers and file downloads
//!
//! Provides a wrapper around reqwest with retry support. Transport failures
//! are retried; HTTP status errors are returned immediately.

use crate::error::{Error, Result};
use crate::hash::verify_checksum;
use reqwest::blocking::Client;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for failed requests
pub const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (multiplied by the attempt number)
const RETRY_DELAY_MS: u64 = 1000;

/// HTTP client wrapper with retry support
pub struct HttpClient {
    client: Client,
    max_retries: u32,
}

impl HttpClient {
    /// Create a client with the default timeout and retry count
    pub fn new() -> Result<Self> {
        Self::with_settings(HTTP_TIMEOUT, MAX_RETRIES)
    }

    /// Create a client with an explicit timeout and retry count
    pub fn with_settings(timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("provisioner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
        })
    }

    /// Send a GET request, retrying transport failures
    fn get_with_retry(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::NetworkError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::NetworkError(format!(
                            "Failed to fetch {url} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Download a URL to bytes (keys, small metadata files)
    pub fn download_to_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);
        let response = self.get_with_retry(url)?;

        let bytes = response
            .bytes()
            .map_err(|e| Error::NetworkError(format!("Failed to read response from {url}: {e}")))?;

        Ok(bytes.to_vec())
    }

    /// Download a file to the specified path
    ///
    /// The body is written to a sibling temporary file and renamed into
    /// place only once complete and, when `checksum` is given, verified.
    /// A failed transfer or a digest mismatch leaves any existing
    /// destination untouched.
    pub fn download_file(
        &self,
        url: &str,
        dest_path: &Path,
        checksum: Option<&str>,
    ) -> Result<u64> {
        info!("Downloading {} to {}", url, dest_path.display());

        let parent = dest_path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {e}", parent.display()))
        })?;

        let mut response = self.get_with_retry(url)?;

        let mut temp = NamedTempFile::new_in(parent).map_err(|e| {
            Error::IoError(format!("Failed to create temporary file in {}: {e}", parent.display()))
        })?;

        let written = io::copy(&mut response, temp.as_file_mut())
            .map_err(|e| Error::NetworkError(format!("Failed to read response from {url}: {e}")))?;

        persist_verified(temp, dest_path, checksum)?;

        debug!("Wrote {} bytes to {}", written, dest_path.display());
        Ok(written)
    }
}

/// Check a completed download against `checksum`, then move it over `dest_path`
///
/// On mismatch the temporary file is dropped (and deleted) and `dest_path`
/// is never touched.
fn persist_verified(temp: NamedTempFile, dest_path: &Path, checksum: Option<&str>) -> Result<()> {
    if let Some(expected) = checksum {
        verify_checksum(temp.path(), expected).map_err(|e| match e {
            Error::ChecksumMismatch {
                expected, actual, ..
            } => Error::ChecksumMismatch {
                path: dest_path.display().to_string(),
                expected,
                actual,
            },
            other => other,
        })?;
    }

    temp.persist(dest_path).map_err(|e| {
        Error::IoError(format!("Failed to move download to {}: {e}", dest_path.display()))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const HELLO_SHA256: &str =
        "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn staged(dir: &TempDir, content: &str) -> NamedTempFile {
        let mut temp = NamedTempFile::new_in(dir.path()).unwrap();
        temp.write_all(content.as_bytes()).unwrap();
        temp.flush().unwrap();
        temp
    }

    #[test]
    fn test_client_creation() {
        let client = HttpClient::with_settings(Duration::from_secs(5), 0).unwrap();
        assert_eq!(client.max_retries, 1);
    }

    #[test]
    fn test_unreachable_host_is_network_error() {
        let client = HttpClient::with_settings(Duration::from_secs(2), 1).unwrap();
        // Port 9 on localhost is the discard service; nothing listens there in CI
        let err = client.download_to_bytes("http://127.0.0.1:9/key").unwrap_err();
        assert!(matches!(err, Error::NetworkError(_)));
    }

    #[test]
    fn test_checksum_mismatch_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("php.gpg");
        fs::write(&dest, "previous key").unwrap();

        let temp = staged(&dir, "hello");
        let wrong = format!("sha256:{}", "0".repeat(64));
        let err = persist_verified(temp, &dest, Some(&wrong)).unwrap_err();

        match err {
            Error::ChecksumMismatch { path, actual, .. } => {
                assert_eq!(path, dest.display().to_string());
                assert_eq!(actual, HELLO_SHA256);
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&dest).unwrap(), "previous key");
        // Only the pre-existing file is left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_verified_download_replaces_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("php.gpg");
        fs::write(&dest, "previous key").unwrap();

        let temp = staged(&dir, "hello");
        persist_verified(temp, &dest, Some(HELLO_SHA256)).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "hello");
    }
}
