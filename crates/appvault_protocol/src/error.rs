//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A path or archive entry name escapes the application namespace.
    #[error("unsafe path {path:?}: {reason}")]
    UnsafePath {
        /// The offending path as received.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A content hash is not a 64-character lowercase hex digest.
    #[error("invalid content hash: {0:?}")]
    InvalidHash(String),

    /// An application or submission identifier is malformed.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A handshake token could not be decoded.
    #[error("malformed handshake token: {0}")]
    MalformedToken(String),

    /// A zip archive is unreadable or structurally wrong.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// A bundle footer failed to parse or its digest did not match.
    #[error("malformed bundle footer: {0}")]
    MalformedFooter(String),

    /// A JSON body failed to parse.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required form field is missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

impl ProtocolError {
    pub(crate) fn archive(err: impl std::fmt::Display) -> Self {
        ProtocolError::MalformedArchive(err.to_string())
    }

    /// Returns true if the error is a path that tried to leave its namespace.
    pub fn is_path_violation(&self) -> bool {
        matches!(self, ProtocolError::UnsafePath { .. })
    }
}

impl From<zip::result::ZipError> for ProtocolError {
    fn from(err: zip::result::ZipError) -> Self {
        ProtocolError::archive(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_violation_classification() {
        let err = ProtocolError::UnsafePath {
            path: "../x".into(),
            reason: "parent directory segment",
        };
        assert!(err.is_path_violation());
        assert!(!ProtocolError::InvalidHash("zz".into()).is_path_violation());
    }

    #[test]
    fn error_display_names_the_path() {
        let err = ProtocolError::UnsafePath {
            path: "../bad-file".into(),
            reason: "parent directory segment",
        };
        assert!(err.to_string().contains("../bad-file"));
    }
}
