//! Directory-based storage backend for persistent storage.

use crate::backend::{validate_key, KeyValueBackend};
use crate::error::{StorageError, StorageResult};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Directory under the root where values are written before being linked
/// into place. Its name cannot collide with a key segment.
const STAGING_DIR: &str = ".staging";

/// A directory-based storage backend.
///
/// Every key maps to one file below the root directory, with key segments
/// becoming path components (`blobs/ab12` → `<root>/blobs/ab12`). Values
/// survive process restarts.
///
/// # Durability
///
/// Values are written to a staging file, synced, and then moved into place,
/// so readers never observe a partially written value.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads. Atomicity
/// of `put_if_absent` comes from `hard_link`, which fails when the target
/// already exists.
///
/// # Example
///
/// ```no_run
/// use appvault_storage::{KeyValueBackend, DirectoryBackend};
/// use std::path::Path;
///
/// let backend = DirectoryBackend::open(Path::new("/var/lib/appvault")).unwrap();
/// backend.put("blobs/abc", b"persistent data").unwrap();
/// ```
#[derive(Debug)]
pub struct DirectoryBackend {
    root: PathBuf,
    staging_seq: AtomicU64,
}

impl DirectoryBackend {
    /// Opens or creates a directory backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or staging directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
            staging_seq: AtomicU64::new(0),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        let mut path = self.root.clone();
        path.extend(key.split('/'));
        Ok(path)
    }

    /// Writes `value` to a fresh, synced staging file.
    ///
    /// The file is removed again when the returned guard drops, including
    /// when the write itself fails.
    ///
    /// Names left over from an interrupted run, or in use by another
    /// process sharing the root, are skipped.
    fn stage(&self, value: &[u8]) -> StorageResult<StagedFile> {
        let (file, path) = loop {
            let seq = self.staging_seq.fetch_add(1, Ordering::SeqCst);
            let path = self
                .root
                .join(STAGING_DIR)
                .join(format!("{}-{}", std::process::id(), seq));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (file, path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        };
        let staged = StagedFile { path };
        write_synced(file, value)?;
        Ok(staged)
    }

    fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn collect_keys(dir: &Path, prefix: &str, out: &mut Vec<String>) -> StorageResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let key = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            if validate_key(&key).is_err() {
                // Staging files and anything not written through this backend.
                continue;
            }
            if entry.file_type()?.is_dir() {
                Self::collect_keys(&entry.path(), &key, out)?;
            } else {
                out.push(key);
            }
        }
        Ok(())
    }
}

fn write_synced(mut file: File, value: &[u8]) -> std::io::Result<()> {
    file.write_all(value)?;
    file.sync_all()
}

/// A staging file, deleted on drop unless it was already moved away.
#[derive(Debug)]
struct StagedFile {
    path: PathBuf,
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "staging file left behind"),
        }
    }
}

impl KeyValueBackend for DirectoryBackend {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if path.is_dir() => Err(StorageError::Corrupted(format!(
                "key {key:?} names a directory: {e}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key)?;
        Self::ensure_parent(&path)?;
        let staged = self.stage(value)?;
        fs::rename(&staged.path, &path)?;
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        if path.is_file() {
            return Ok(false);
        }
        Self::ensure_parent(&path)?;
        let staged = self.stage(value)?;
        match fs::hard_link(&staged.path, &path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        Self::collect_keys(&self.root, "", &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}
