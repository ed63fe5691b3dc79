//! Live manifests, one per application.

use crate::auth::unix_now;
use crate::error::ServerResult;
use crate::record;
use appvault_protocol::{AppId, Manifest};
use appvault_storage::KeyValueBackend;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const MANIFEST_PREFIX: &str = "manifests/";

#[derive(Serialize, Deserialize)]
struct ManifestRecord {
    manifest: Manifest,
    updated_at: u64,
}

/// Stores the live manifest of each application.
///
/// A manifest is replaced as a whole in a single backend write, so readers
/// see either the old listing or the new one. Mutators serialize per
/// application through [`app_lock`](Self::app_lock).
pub struct ManifestStore {
    backend: Arc<dyn KeyValueBackend>,
    locks: Mutex<HashMap<AppId, Arc<Mutex<()>>>>,
}

impl ManifestStore {
    /// Creates a manifest store over `backend`.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key(app_id: &AppId) -> String {
        format!("{MANIFEST_PREFIX}{app_id}")
    }

    /// Returns the lock that serializes mutations of `app_id`.
    ///
    /// Different applications get different locks. Entries nobody holds
    /// are dropped from the map on each call, so it only grows with the
    /// number of applications being mutated at once.
    pub fn app_lock(&self, app_id: &AppId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        // Handles are only cloned under the map lock, so a count of one
        // cannot rise while we look at it.
        locks.retain(|id, lock| id == app_id || Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(app_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns the manifest of `app_id`, or `None` if it was never pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or the record is damaged.
    pub fn get(&self, app_id: &AppId) -> ServerResult<Option<Manifest>> {
        let key = Self::key(app_id);
        match self.backend.get(&key)? {
            Some(bytes) => Ok(Some(record::decode::<ManifestRecord>(&key, &bytes)?.manifest)),
            None => Ok(None),
        }
    }

    /// Returns the manifest of `app_id`, empty if it was never pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or the record is damaged.
    pub fn get_hashes(&self, app_id: &AppId) -> ServerResult<Manifest> {
        Ok(self.get(app_id)?.unwrap_or_default())
    }

    /// Returns true if `app_id` has been pushed, even with an empty listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend lookup fails.
    pub fn exists(&self, app_id: &AppId) -> ServerResult<bool> {
        Ok(self.backend.exists(&Self::key(app_id))?)
    }

    /// Replaces the manifest of `app_id`.
    ///
    /// Callers hold the application's lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn replace(&self, app_id: &AppId, manifest: Manifest) -> ServerResult<()> {
        let entries = manifest.len();
        let bytes = record::encode(&ManifestRecord {
            manifest,
            updated_at: unix_now(),
        })?;
        self.backend.put(&Self::key(app_id), &bytes)?;
        debug!(app_id = %app_id, entries, "manifest replaced");
        Ok(())
    }

    /// Lists every application that has been pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend listing fails.
    pub fn apps(&self) -> ServerResult<Vec<AppId>> {
        Ok(self
            .backend
            .keys(MANIFEST_PREFIX)?
            .iter()
            .filter_map(|key| key.strip_prefix(MANIFEST_PREFIX))
            .filter_map(|id| AppId::parse(id).ok())
            .collect())
    }
}
