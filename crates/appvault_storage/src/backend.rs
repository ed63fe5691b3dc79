//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};

/// Maximum length of a single key, in bytes.
const MAX_KEY_LEN: usize = 512;

/// A keyed byte store.
///
/// Backends are **opaque**. They store and return bytes under string keys
/// and never interpret either. Keys are `/`-separated segments; every
/// method validates its key with [`validate_key`] before touching storage.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `put` for a key
/// - `put_if_absent` writes only when the key does not exist, atomically
///   with respect to other `put_if_absent` calls on the same key
/// - `keys` returns keys in ascending lexicographic order
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::DirectoryBackend`] - For persistent storage
pub trait KeyValueBackend: Send + Sync {
    /// Returns the bytes stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Stores `value` under `key` only if nothing is stored there yet.
    ///
    /// Returns `true` if this call wrote the value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn put_if_absent(&self, key: &str, value: &[u8]) -> StorageResult<bool>;

    /// Returns true if a value is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Removes the value stored under `key`.
    ///
    /// Returns `true` if a value was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Lists every key starting with `prefix`, sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Checks that `key` is a well-formed storage key.
///
/// A key is one or more non-empty segments separated by `/`. Segments use
/// ASCII letters, digits, `.`, `_` and `-`, and must start with a letter or
/// digit, so `.` and `..` can never appear and a key can never name a path
/// outside the backend's namespace.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] describing the offending key.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    for segment in key.split('/') {
        let mut chars = segment.chars();
        let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !first_ok || !rest_ok {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
    }

    Ok(())
}
