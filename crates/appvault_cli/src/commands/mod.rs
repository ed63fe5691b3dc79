//! CLI command implementations.

pub mod gc;
pub mod inspect;
pub mod token;
pub mod verify;

use appvault_server::{ServerConfig, SyncServer};
use appvault_storage::{DirectoryBackend, KeyValueBackend};
use std::path::Path;
use std::sync::Arc;

/// A data directory opened for maintenance.
pub struct Store {
    /// The raw backend, for on-disk statistics.
    pub backend: Arc<DirectoryBackend>,
    /// A server over the same backend.
    pub server: SyncServer,
}

/// Opens the data directory at `path`.
///
/// Admin commands never validate handshakes, so the server gets no secret.
pub fn open_store(path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No data directory found at {:?}", path).into());
    }
    let backend = Arc::new(DirectoryBackend::open(path)?);
    let config = ServerConfig::new(Vec::new()).with_data_dir(path);
    let shared: Arc<dyn KeyValueBackend> = backend.clone();
    let server = SyncServer::with_backend(config, shared);
    Ok(Store { backend, server })
}
