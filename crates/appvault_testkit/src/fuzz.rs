//! Fuzz testing harnesses for AppVault.
//!
//! This module provides fuzz targets that can be used with cargo-fuzz
//! or other fuzzing frameworks. Every target must return normally for any
//! input; a panic is a bug.

use crate::fixtures::{dev_query, TestServer};
use appvault_protocol::{Action, BundleFooter, HandshakeToken, LogicalPath, PushArchive};
use appvault_server::Request;

/// Fuzz target for push archive decoding.
///
/// Arbitrary bytes either decode or return an error.
pub fn fuzz_push_archive(data: &[u8]) {
    let _ = PushArchive::from_zip(data);
}

/// Fuzz target for bundle footer decoding.
pub fn fuzz_bundle_footer(data: &[u8]) {
    let _ = BundleFooter::decode(data);
}

/// Fuzz target for handshake token decoding.
pub fn fuzz_handshake_token(data: &[u8]) {
    let text = String::from_utf8_lossy(data);
    if let Ok(token) = HandshakeToken::decode(&text) {
        let _ = token.scope();
    }
}

/// Fuzz target for path validation.
///
/// Any path that parses must not be able to leave its namespace.
pub fn fuzz_logical_path(data: &[u8]) {
    let text = String::from_utf8_lossy(data);
    if let Ok(path) = LogicalPath::parse(&text) {
        let s = path.as_str();
        assert!(!s.starts_with('/'), "absolute path accepted: {s:?}");
        assert!(
            s.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != ".."),
            "escaping path accepted: {s:?}"
        );
    }
}

/// Fuzz target for the push endpoint.
///
/// Whatever the body, the server answers with a status and never leaves a
/// partial manifest behind: either the push succeeded or the app is still
/// empty.
pub fn fuzz_push_endpoint(data: &[u8]) {
    let server = TestServer::memory();
    let app = "fuzz-app";
    let response = server.handle(&Request::post(
        &format!("/push/{app}/?{}", dev_query(Action::Push, app)),
        data.to_vec(),
    ));
    if response.status != 200 {
        assert!(
            server.hashes(app).is_empty(),
            "failed push left a manifest behind"
        );
    }
}
