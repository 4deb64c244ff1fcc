//! File system helpers: fingerprints and metadata preservation.

pub mod fingerprint;
pub mod metadata;

pub use fingerprint::{CheapFingerprint, Change, Fingerprint};
