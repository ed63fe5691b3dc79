//! Content-addressed blob storage.

use crate::error::{ServerError, ServerResult};
use appvault_protocol::ContentHash;
use appvault_storage::KeyValueBackend;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const BLOB_PREFIX: &str = "blobs/";

/// Immutable bytes keyed by their SHA-256 digest.
///
/// Writing the same bytes twice stores them once. Reads re-verify the
/// digest, so a damaged backend surfaces as [`ServerError::Corrupted`]
/// instead of serving wrong content.
pub struct BlobStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl BlobStore {
    /// Creates a blob store over `backend`.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    fn key(hash: &ContentHash) -> String {
        format!("{BLOB_PREFIX}{hash}")
    }

    /// Stores `bytes` and returns their hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn put(&self, bytes: &[u8]) -> ServerResult<ContentHash> {
        let hash = ContentHash::of(bytes);
        let written = self.backend.put_if_absent(&Self::key(&hash), bytes)?;
        debug!(hash = %hash, len = bytes.len(), written, "blob put");
        Ok(hash)
    }

    /// Returns the bytes stored under `hash`.
    ///
    /// # Errors
    ///
    /// - [`ServerError::BlobNotFound`] if nothing is stored
    /// - [`ServerError::Corrupted`] if the stored bytes do not match
    pub fn get(&self, hash: &ContentHash) -> ServerResult<Vec<u8>> {
        let bytes = self
            .backend
            .get(&Self::key(hash))?
            .ok_or_else(|| ServerError::BlobNotFound(hash.to_string()))?;
        if !hash.matches(&bytes) {
            warn!(hash = %hash, "blob content does not match its hash");
            return Err(ServerError::Corrupted(format!("blob {hash}")));
        }
        Ok(bytes)
    }

    /// Returns true if a blob is stored under `hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend lookup fails.
    pub fn exists(&self, hash: &ContentHash) -> ServerResult<bool> {
        Ok(self.backend.exists(&Self::key(hash))?)
    }

    /// Lists every stored hash. Keys that are not valid digests are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend listing fails.
    pub fn hashes(&self) -> ServerResult<Vec<ContentHash>> {
        Ok(self
            .backend
            .keys(BLOB_PREFIX)?
            .iter()
            .filter_map(|key| key.strip_prefix(BLOB_PREFIX))
            .filter_map(|hex| ContentHash::parse(hex).ok())
            .collect())
    }

    /// Deletes every blob not in `referenced` and returns how many went.
    ///
    /// The caller must ensure no writer can add a reference concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend listing or a delete fails.
    pub(crate) fn collect_garbage(&self, referenced: &BTreeSet<ContentHash>) -> ServerResult<usize> {
        let mut removed = 0;
        for hash in self.hashes()? {
            if !referenced.contains(&hash) && self.backend.delete(&Self::key(&hash))? {
                removed += 1;
            }
        }
        info!(removed, kept = referenced.len(), "blob garbage collection");
        Ok(removed)
    }
}
