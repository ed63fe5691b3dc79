//! # AppVault Server
//!
//! Content-addressed sync server for application source trees.
//!
//! This crate provides:
//! - Handshake validation (HMAC-SHA256 signed, action and flavour scoped)
//! - A blob store keyed by SHA-256, with garbage collection
//! - Live per-application manifests and write-once submissions
//! - Push ingestion and pull bundle assembly
//! - A transport-agnostic router for the HTTP endpoints
//!
//! # Architecture
//!
//! Every store sits on one [`KeyValueBackend`](appvault_storage::KeyValueBackend):
//! - `blobs/<hash>` - file content, written once
//! - `manifests/<app_id>` - the live path → hash manifest of an app
//! - `submissions/<submission_id>` - frozen manifest copies
//!
//! Manifests reference blobs by hash only, so a rename or a submission never
//! copies content.
//!
//! # Authentication
//!
//! ```rust
//! use appvault_protocol::{Action, HandshakeToken};
//! use appvault_server::{HandshakeSigner, Request, ServerConfig, SyncServer};
//!
//! let secret = b"my-secure-secret".to_vec();
//! let server = SyncServer::new(ServerConfig::new(secret.clone()));
//!
//! let token = HandshakeToken::development(Action::Push, "my-app", "dev-1", appvault_server::unix_now());
//! let signed = HandshakeSigner::new(secret).sign(&token).unwrap();
//!
//! let response = server.handle(&Request::get(&format!("/push/my-app/?{}", signed.query())));
//! assert_eq!(response.status, 200);
//! assert_eq!(response.text_body(), r#"{"hashes":{}}"#);
//! ```
//!
//! # Protocol
//!
//! 1. The client fetches the live manifest (`GET /push/{app_id}/`)
//! 2. It uploads only the files whose hashes differ (`POST /push/{app_id}/`)
//! 3. It may freeze the manifest as a submission (`POST /submit/{app_id}/`)
//! 4. It pulls the assets it lacks plus the sources (`POST /pull/{app_id}/`)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod blob_store;
mod config;
mod error;
mod handler;
mod icon;
mod manifest_store;
mod metadata;
mod pull;
mod push;
mod record;
mod router;
mod server;
mod submission;

pub use auth::{
    unix_now, AuthConfig, AuthContext, HandshakeSigner, HandshakeValidator, SignedHandshake,
};
pub use blob_store::BlobStore;
pub use config::{
    ServerConfig, SourcePolicy, DEFAULT_ASSET_EXTENSIONS, ENV_DATA_DIR, ENV_SECRET, ENV_TOKEN_TTL,
};
pub use error::{AuthFailure, ServerError, ServerResult, INTERNAL_ERROR_MESSAGE};
pub use handler::{Credentials, GcReport, HandlerContext, RequestHandler, HEALTHCHECK_PASSED};
pub use icon::{AppIcon, Platform};
pub use manifest_store::ManifestStore;
pub use metadata::{AppMetadata, PlatformMetadata, METADATA_FILE};
pub use pull::PullAssembler;
pub use push::{PushIngestor, PushReport, PROGRESS_PREFIX};
pub use router::{Method, Request, Response, Router, APPLICATION_JSON, APPLICATION_ZIP, TEXT_PLAIN};
pub use server::SyncServer;
pub use submission::{Submission, SubmissionStore};
