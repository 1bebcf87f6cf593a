//! Memoized rewrite outputs
//!
//! Rewriting is deterministic, so an output can be reused for any later
//! request with the same type name, input bytes and rename map. The cache is
//! keyed by the SHA-256 digest of those three inputs and may be shared by
//! several sessions.

use super::{MarkerRewriter, RewriteError};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache key: SHA-256 of the rewrite inputs
pub type RewriteKey = [u8; 32];

/// Thread-safe memo of rewrite outputs
#[derive(Debug, Default)]
pub struct RewriteCache {
    entries: Mutex<FxHashMap<RewriteKey, Arc<[u8]>>>,
    hits: AtomicU64,
}

impl RewriteCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of the rewrite inputs
    pub fn key(binary_name: &str, bytes: &[u8], renames: &BTreeMap<String, String>) -> RewriteKey {
        let mut hasher = Sha256::new();
        hasher.update((binary_name.len() as u64).to_le_bytes());
        hasher.update(binary_name.as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
        for (from, to) in renames {
            hasher.update((from.len() as u64).to_le_bytes());
            hasher.update(from.as_bytes());
            hasher.update((to.len() as u64).to_le_bytes());
            hasher.update(to.as_bytes());
        }
        hasher.finalize().into()
    }

    /// Return the memoized output or run the rewriter and remember its result
    pub fn get_or_rewrite(
        &self,
        rewriter: &MarkerRewriter,
        binary_name: &str,
        bytes: &[u8],
        renames: &BTreeMap<String, String>,
    ) -> Result<Arc<[u8]>, RewriteError> {
        let key = Self::key(binary_name, bytes, renames);
        if let Some(found) = self.entries.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("Rewrite cache hit for {} ({})", binary_name, hex::encode(&key[..8]));
            return Ok(found.clone());
        }

        // The lock is not held while rewriting; a racing thread computes the
        // same bytes.
        let output: Arc<[u8]> = rewriter.rewrite(binary_name, bytes, renames)?.into();
        self.entries.lock().insert(key, output.clone());
        Ok(output)
    }

    /// Number of memoized outputs
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of lookups answered from the cache
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Drop every memoized output
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
