// src/repository/mod.rs

//! Package repository plumbing
//!
//! This module provides functionality for:
//! - Writing package source declarations
//! - Fetching and verifying trust keys from key servers
//! - Downloading files with retry support

mod client;

pub mod gpg;
pub mod sources;

pub use client::{HttpClient, HTTP_TIMEOUT, MAX_RETRIES};
pub use gpg::{lookup_url, normalize_fingerprint, verify_key_material, Keyring, TrustKey};
pub use sources::write_source_entry;
