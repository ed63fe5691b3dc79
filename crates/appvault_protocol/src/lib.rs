//! # AppVault Protocol
//!
//! Wire types and archive codecs for the AppVault push/pull/submit protocol.
//!
//! This crate provides:
//! - [`ContentHash`] - SHA-256 content fingerprints (lowercase hex)
//! - [`LogicalPath`], [`AppId`], [`SubmissionId`] - validated names
//! - [`Manifest`] - path → hash listings and their diffs
//! - [`HandshakeToken`] - the signed-request payload (encoding only)
//! - [`PushArchive`] - the zip body of a push
//! - [`PullBundle`] and [`BundleFooter`] - the zip body of a pull response
//! - JSON request and response bodies
//!
//! This is a pure protocol crate with no I/O operations. Signing and
//! verification of handshake tokens live in the server crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod archive;
mod bundle;
mod error;
mod footer;
mod handshake;
mod hash;
mod manifest;
mod messages;
mod path;

pub use archive::{PushArchive, PushArchiveBuilder, DIFFS_DIR, LISTING_FILE};
pub use bundle::{
    asset_key, PullBundle, PullBundleBuilder, ASSETS_DIR, ASSETS_LISTING_FILE,
    ASSET_KEY_PREFIX, BUNDLE_FOOTER_FILE,
};
pub use error::{ProtocolError, ProtocolResult};
pub use footer::{BundleFooter, FooterEntry, FOOTER_MAGIC};
pub use handshake::{Action, HandshakeToken, TokenScope};
pub use hash::ContentHash;
pub use manifest::{Manifest, ManifestDiff};
pub use messages::{form_field, HashesResponse, PullRequest, SubmitForm};
pub use path::{AppId, LogicalPath, SubmissionId};
