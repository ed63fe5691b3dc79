//! # AppVault Storage
//!
//! Key/value storage backends for AppVault.
//!
//! Backends are **opaque byte stores** addressed by string keys. They know
//! nothing about blobs, manifests or submissions; the server crate decides
//! which keys it writes and what the bytes mean.
//!
//! ## Design Principles
//!
//! - Backends are simple keyed stores (get, put, exists, delete, list)
//! - Keys are `/`-separated and validated before any I/O
//! - Must be `Send + Sync`; every method takes `&self`
//! - `put_if_absent` is the only compare-and-set primitive
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral servers
//! - [`DirectoryBackend`] - One file per key under a root directory
//!
//! ## Example
//!
//! ```rust
//! use appvault_storage::{KeyValueBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.put("blobs/abc", b"hello world").unwrap();
//! assert_eq!(backend.get("blobs/abc").unwrap().as_deref(), Some(&b"hello world"[..]));
//! assert!(!backend.exists("blobs/def").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, KeyValueBackend};
pub use error::{StorageError, StorageResult};
pub use file::DirectoryBackend;
pub use memory::InMemoryBackend;
