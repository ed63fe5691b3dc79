//! # AppVault Testkit
//!
//! Test utilities for AppVault.
//!
//! This crate provides:
//! - Test fixtures: a server with a known secret and request shortcuts
//! - Property-based test generators using proptest
//! - Fuzz testing harnesses for every decoder
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use appvault_testkit::prelude::*;
//!
//! let server = TestServer::memory();
//! let response = server.push_files("my-app", &[("index.js", b"console.log(1)")]);
//! assert_eq!(response.status, 200);
//! assert_eq!(server.hashes("my-app").len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use stress::*;
