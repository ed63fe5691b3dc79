//! In-memory storage backend for testing.

use crate::backend::{validate_key, KeyValueBackend};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory storage backend.
///
/// This backend stores all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral servers that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use appvault_storage::{KeyValueBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// assert!(backend.put_if_absent("blobs/x", b"data").unwrap());
/// assert!(!backend.put_if_absent("blobs/x", b"data").unwrap());
/// assert_eq!(backend.write_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    writes: AtomicU64,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of values currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns how many writes actually reached the map.
    ///
    /// Useful for asserting that deduplicated writes were skipped.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Clears all values from the backend.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl KeyValueBackend for InMemoryBackend {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.data.write().insert(key.to_string(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> StorageResult<bool> {
        validate_key(key)?;
        let mut data = self.data.write();
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.data.read().contains_key(key))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.data.write().remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.is_empty());
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn memory_put_and_get() {
        let backend = InMemoryBackend::new();
        backend.put("a/b", b"hello").unwrap();
        assert_eq!(backend.get("a/b").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(backend.get("a/c").unwrap(), None);
    }

    #[test]
    fn memory_put_replaces() {
        let backend = InMemoryBackend::new();
        backend.put("k", b"one").unwrap();
        backend.put("k", b"two").unwrap();
        assert_eq!(backend.get("k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.write_count(), 2);
    }

    #[test]
    fn memory_put_if_absent_skips_existing() {
        let backend = InMemoryBackend::new();
        assert!(backend.put_if_absent("k", b"first").unwrap());
        assert!(!backend.put_if_absent("k", b"second").unwrap());
        assert_eq!(backend.get("k").unwrap(), Some(b"first".to_vec()));
        assert_eq!(backend.write_count(), 1);
    }

    #[test]
    fn memory_delete() {
        let backend = InMemoryBackend::new();
        backend.put("k", b"v").unwrap();
        assert!(backend.delete("k").unwrap());
        assert!(!backend.delete("k").unwrap());
        assert!(!backend.exists("k").unwrap());
    }

    #[test]
    fn memory_keys_by_prefix_sorted() {
        let backend = InMemoryBackend::new();
        backend.put("blobs/b", b"").unwrap();
        backend.put("blobs/a", b"").unwrap();
        backend.put("manifests/x", b"").unwrap();

        assert_eq!(backend.keys("blobs/").unwrap(), vec!["blobs/a", "blobs/b"]);
        assert_eq!(backend.keys("").unwrap().len(), 3);
        assert!(backend.keys("submissions/").unwrap().is_empty());
    }

    #[test]
    fn memory_rejects_invalid_keys() {
        let backend = InMemoryBackend::new();
        let result = backend.put("../escape", b"x");
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(backend.is_empty());
    }

    #[test]
    fn memory_clear() {
        let backend = InMemoryBackend::new();
        backend.put("k", b"v").unwrap();
        backend.clear();
        assert!(backend.is_empty());
    }
}
