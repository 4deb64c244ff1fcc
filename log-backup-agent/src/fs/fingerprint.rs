//! File fingerprints for change detection.
//!
//! A fingerprint has a cheap half (size, mtime) taken from a single `stat`
//! call and an expensive half (SHA-256 of the content). The hash is only
//! computed when the cheap half moved, so an idle log file costs one `stat`
//! per poll.

use crate::fs::metadata::epoch_secs;
use crate::utils::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::warn;

/// Read buffer size used while hashing (1 MiB)
const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Size and modification time of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheapFingerprint {
    /// File size in bytes
    pub size: u64,

    /// Last modified time (seconds since Unix epoch)
    pub mtime: i64,
}

/// Full fingerprint of the last backed-up version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub mtime: i64,
    /// Hex SHA-256 of the content, empty when hashing failed
    pub hash: String,
}

impl Fingerprint {
    pub fn new(cheap: CheapFingerprint, hash: String) -> Self {
        Self {
            size: cheap.size,
            mtime: cheap.mtime,
            hash,
        }
    }

    fn matches(&self, cheap: &CheapFingerprint) -> bool {
        self.size == cheap.size && self.mtime == cheap.mtime
    }
}

/// Outcome of comparing the current file against the last fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Size and mtime match the last fingerprint
    Unchanged,

    /// Size or mtime moved but the content hash is identical (e.g. `touch`)
    MetadataOnly,

    /// Content differs, or could not be proven identical
    Changed {
        /// Hash computed during detection, empty if hashing failed
        hash: String,
    },
}

/// Stat the file and return its size and whole-second mtime.
pub fn cheap_fingerprint(path: &Path) -> Result<CheapFingerprint> {
    let metadata = fs::metadata(path).map_err(|e| AgentError::from_stat(path, e))?;
    let modified = metadata
        .modified()
        .map_err(|e| AgentError::from_stat(path, e))?;

    Ok(CheapFingerprint {
        size: metadata.len(),
        mtime: epoch_secs(modified),
    })
}

/// SHA-256 of the file content as lowercase hex.
///
/// Reads in fixed-size chunks so memory stays bounded for large files.
pub fn hash_file(path: &Path) -> Result<String> {
    let hash_err = |source| AgentError::Hash {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(hash_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(hash_err(e)),
        };
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Like [`hash_file`], but a failure degrades to an empty string.
pub fn hash_file_or_empty(path: &Path) -> String {
    match hash_file(path) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("{} (assuming content changed)", e);
            String::new()
        }
    }
}

/// Decide whether the file at `path` changed since `last`.
pub fn has_changed(
    path: &Path,
    current: &CheapFingerprint,
    last: Option<&Fingerprint>,
) -> Change {
    detect_change(current, last, || hash_file_or_empty(path))
}

/// Two-tier change decision with the hash supplied lazily.
///
/// `hash` is only invoked when size or mtime differ from `last`.
pub fn detect_change<F>(
    current: &CheapFingerprint,
    last: Option<&Fingerprint>,
    hash: F,
) -> Change
where
    F: FnOnce() -> String,
{
    if let Some(last) = last {
        if last.matches(current) {
            return Change::Unchanged;
        }
    }

    let hash = hash();
    match last {
        Some(last) if !hash.is_empty() && hash == last.hash => Change::MetadataOnly,
        _ => Change::Changed { hash },
    }
}
