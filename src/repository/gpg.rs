// src/repository/gpg.rs

//! Trust key handling for added package sources
//!
//! Keys are fetched from an HKP key server, checked against the fingerprint
//! declared in the recipe using sequoia-openpgp (pure Rust implementation),
//! and written into the package manager's trusted key directory.

use crate::error::{Error, Result};
use openpgp::parse::Parse;
use sequoia_openpgp as openpgp;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};
use url::Url;

/// Default HKP port for `hkp://` key server URLs
const HKP_PORT: u16 = 11371;

/// Normalize a fingerprint to uppercase hex without spaces or `0x` prefix
///
/// Accepts v4 (40 hex digits) and v5/v6 (64 hex digits) fingerprints.
pub fn normalize_fingerprint(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let hex: String = without_prefix
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::ParseError(format!(
            "Invalid fingerprint '{}': expected hexadecimal digits",
            raw
        )));
    }

    if hex.len() != 40 && hex.len() != 64 {
        return Err(Error::ParseError(format!(
            "Invalid fingerprint '{}': expected 40 or 64 hex digits, got {}",
            raw,
            hex.len()
        )));
    }

    Ok(hex)
}

/// Build the HKP lookup URL for a fingerprint
///
/// `hkp://` maps to plain HTTP on port 11371 and `hkps://` to HTTPS. A key
/// server URL that already points at `/pks/lookup` keeps its path.
pub fn lookup_url(keyserver: &str, fingerprint: &str) -> Result<String> {
    let (normalized, default_port) = if let Some(rest) = keyserver.strip_prefix("hkp://") {
        (format!("http://{}", rest), Some(HKP_PORT))
    } else if let Some(rest) = keyserver.strip_prefix("hkps://") {
        (format!("https://{}", rest), None)
    } else {
        (keyserver.to_string(), None)
    };

    let mut url = Url::parse(&normalized)
        .map_err(|e| Error::ParseError(format!("Invalid key server URL '{}': {}", keyserver, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::ParseError(format!(
            "Unsupported key server scheme '{}' in {}",
            url.scheme(),
            keyserver
        )));
    }

    if let Some(port) = default_port {
        if url.port().is_none() {
            url.set_port(Some(port))
                .map_err(|_| Error::ParseError(format!("Cannot set port on {}", keyserver)))?;
        }
    }

    if !url.path().ends_with("/pks/lookup") {
        url.set_path("/pks/lookup");
    }

    url.query_pairs_mut()
        .clear()
        .append_pair("op", "get")
        .append_pair("options", "mr")
        .append_pair("search", &format!("0x{}", fingerprint));

    Ok(url.to_string())
}

/// A verified trust key ready to be installed
#[derive(Debug, Clone)]
pub struct TrustKey {
    /// Normalized fingerprint that was requested
    pub fingerprint: String,
    /// Raw key material as served (armored or binary)
    pub data: Vec<u8>,
    /// Whether the material is ASCII-armored
    pub armored: bool,
}

impl TrustKey {
    /// File name used in the trusted key directory
    pub fn file_name(&self) -> String {
        let ext = if self.armored { "asc" } else { "gpg" };
        format!("{}.{}", self.fingerprint, ext)
    }
}

/// Parse fetched key material and check it carries the expected fingerprint
///
/// The primary key or any subkey may match.
pub fn verify_key_material(data: &[u8], fingerprint: &str) -> Result<TrustKey> {
    let cert = openpgp::Cert::from_bytes(data)
        .map_err(|e| Error::TrustError(format!("Failed to parse key {}: {}", fingerprint, e)))?;

    let found: Vec<String> = cert.keys().map(|ka| ka.key().fingerprint().to_hex()).collect();
    debug!("Key material contains fingerprints: {}", found.join(", "));

    if !found.iter().any(|fp| fp == fingerprint) {
        return Err(Error::TrustError(format!(
            "Key server returned {} but {} was requested",
            cert.fingerprint().to_hex(),
            fingerprint
        )));
    }

    let armored = data
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(15)
        .copied()
        .eq(b"-----BEGIN PGP ".iter().copied());

    Ok(TrustKey {
        fingerprint: fingerprint.to_string(),
        data: data.to_vec(),
        armored,
    })
}

/// Directory of trusted keys used by the package manager
pub struct Keyring {
    dir: PathBuf,
}

impl Keyring {
    /// Open (and create if needed) a trusted key directory
    pub fn new(dir: PathBuf) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| Error::IoError(format!("Failed to create keyring directory: {}", e)))?;
        }
        Ok(Self { dir })
    }

    /// Install a verified key; returns false if an identical key was present
    pub fn install(&self, key: &TrustKey) -> Result<bool> {
        let path = self.dir.join(key.file_name());

        if let Ok(existing) = fs::read(&path) {
            if existing == key.data {
                debug!("Key {} already installed at {}", key.fingerprint, path.display());
                return Ok(false);
            }
        }

        fs::write(&path, &key.data)
            .map_err(|e| Error::IoError(format!("Failed to write key {}: {}", path.display(), e)))?;

        info!("Imported trust key {} to {}", key.fingerprint, path.display());
        Ok(true)
    }

    /// Check whether a key with this fingerprint is installed
    pub fn has_key(&self, fingerprint: &str) -> bool {
        ["asc", "gpg"]
            .iter()
            .any(|ext| self.dir.join(format!("{}.{}", fingerprint, ext)).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpgp::cert::CertBuilder;
    use openpgp::serialize::SerializeInto;
    use tempfile::TempDir;

    const SBT_KEY: &str = "2EE0EA64E40A89B84B2DF73499E82A75642AC823";

    fn generated_key() -> (String, Vec<u8>) {
        let (cert, _rev) = CertBuilder::general_purpose(None, Some("Test Signer <signer@example.org>"))
            .generate()
            .unwrap();
        let armored = cert.armored().to_vec().unwrap();
        (cert.fingerprint().to_hex(), armored)
    }

    #[test]
    fn test_normalize_fingerprint() {
        assert_eq!(normalize_fingerprint(SBT_KEY).unwrap(), SBT_KEY);
        assert_eq!(
            normalize_fingerprint("0x2ee0ea64e40a89b84b2df73499e82a75642ac823").unwrap(),
            SBT_KEY
        );
        assert_eq!(
            normalize_fingerprint("2EE0 EA64 E40A 89B8 4B2D  F734 99E8 2A75 642A C823").unwrap(),
            SBT_KEY
        );

        let v6 = "0x2ee0ea64e40a89b84b2df73499e82a75642ac8232ee0ea64e40a89b84b2df734";
        assert_eq!(
            normalize_fingerprint(v6).unwrap(),
            "2EE0EA64E40A89B84B2DF73499E82A75642AC8232EE0EA64E40A89B84B2DF734"
        );
    }

    #[test]
    fn test_normalize_fingerprint_rejects_bad_input() {
        assert!(normalize_fingerprint("642AC823").is_err());
        assert!(normalize_fingerprint("ZZE0EA64E40A89B84B2DF73499E82A75642AC823").is_err());
    }

    #[test]
    fn test_lookup_url_https() {
        let url = lookup_url("https://keyserver.ubuntu.com", SBT_KEY).unwrap();
        assert_eq!(
            url,
            format!(
                "https://keyserver.ubuntu.com/pks/lookup?op=get&options=mr&search=0x{}",
                SBT_KEY
            )
        );
    }

    #[test]
    fn test_lookup_url_hkp_schemes() {
        let url = lookup_url("hkp://keyserver.example.org", SBT_KEY).unwrap();
        assert!(url.starts_with("http://keyserver.example.org:11371/pks/lookup?"));

        let url = lookup_url("hkps://keys.example.org", SBT_KEY).unwrap();
        assert!(url.starts_with("https://keys.example.org/pks/lookup?"));
    }

    #[test]
    fn test_lookup_url_replaces_existing_query() {
        let url = lookup_url(
            "https://keyserver.ubuntu.com/pks/lookup?op=index&search=old",
            SBT_KEY,
        )
        .unwrap();
        assert!(!url.contains("old"));
        assert!(url.contains("op=get"));
    }

    #[test]
    fn test_lookup_url_rejects_unknown_scheme() {
        assert!(lookup_url("ftp://keys.example.org", SBT_KEY).is_err());
        assert!(lookup_url("not a url", SBT_KEY).is_err());
    }

    #[test]
    fn test_verify_key_material() {
        let (fingerprint, armored) = generated_key();
        let key = verify_key_material(&armored, &fingerprint).unwrap();
        assert!(key.armored);
        assert_eq!(key.file_name(), format!("{}.asc", fingerprint));
    }

    #[test]
    fn test_verify_key_material_wrong_fingerprint() {
        let (_fingerprint, armored) = generated_key();
        let err = verify_key_material(&armored, SBT_KEY).unwrap_err();
        assert!(matches!(err, Error::TrustError(_)));
    }

    #[test]
    fn test_verify_key_material_garbage() {
        let err = verify_key_material(b"<html>Not Found</html>", SBT_KEY).unwrap_err();
        assert!(matches!(err, Error::TrustError(_)));
    }

    #[test]
    fn test_keyring_install_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let keyring = Keyring::new(temp.path().join("trusted.gpg.d")).unwrap();
        let (fingerprint, armored) = generated_key();
        let key = verify_key_material(&armored, &fingerprint).unwrap();

        assert!(!keyring.has_key(&fingerprint));
        assert!(keyring.install(&key).unwrap());
        assert!(!keyring.install(&key).unwrap());
        assert!(keyring.has_key(&fingerprint));
        assert_eq!(
            fs::read(temp.path().join("trusted.gpg.d").join(key.file_name())).unwrap(),
            key.data
        );
    }
}
