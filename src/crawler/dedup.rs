//! Content fingerprinting and change detection

use crate::storage::{Storage, StorageResult};
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of the normalized page body
pub fn fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// What storing a record would do to the content store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// No record for this URL yet
    New,
    /// A record exists with a different fingerprint
    Changed,
    /// A record exists with the same fingerprint; nothing to write
    Unchanged,
}

impl DedupDecision {
    pub fn needs_write(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Compares `fingerprint` against the stored fingerprint for `url`
pub fn decide<S: Storage + ?Sized>(
    store: &S,
    url: &str,
    fingerprint: &str,
) -> StorageResult<DedupDecision> {
    Ok(match store.lookup_fingerprint(url)? {
        None => DedupDecision::New,
        Some(existing) if existing == fingerprint => DedupDecision::Unchanged,
        Some(_) => DedupDecision::Changed,
    })
}
