//! Error types for the sync server.

use appvault_protocol::{AppId, ProtocolError, SubmissionId};
use appvault_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Body returned for every 5xx response.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error.";

/// Why a handshake was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `handshake_token` or `handshake_signature` parameter.
    MissingHandshake,
    /// The signature does not match the token.
    InvalidSignature,
    /// The token is not base64 JSON, or its identity fields are wrong.
    MalformedToken,
    /// The token names a different application.
    AppMismatch,
    /// The token authorizes a different action.
    ActionMismatch,
    /// The token flavour may not perform this action.
    FlavourMismatch,
    /// The token is too old, or issued in the future.
    Expired,
    /// A pull names a submission the token is not bound to.
    SubmissionMismatch,
}

impl AuthFailure {
    /// Returns the message sent to the client.
    pub fn message(self) -> &'static str {
        match self {
            AuthFailure::MissingHandshake => "Missing handshake.",
            AuthFailure::InvalidSignature => "Invalid handshake signature.",
            AuthFailure::MalformedToken => "Malformed handshake token.",
            AuthFailure::AppMismatch => "Handshake is for a different app.",
            AuthFailure::ActionMismatch => "Handshake is for a different action.",
            AuthFailure::FlavourMismatch => "Handshake type not allowed for this action.",
            AuthFailure::Expired => "Handshake has expired.",
            AuthFailure::SubmissionMismatch => "Handshake is for a different submission.",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The handshake was refused.
    #[error("unauthorized: {0}")]
    Unauthorized(AuthFailure),

    /// A path tried to leave the application namespace.
    #[error("path security violation: {0}")]
    PathSecurity(String),

    /// Uploaded bytes do not hash to the declared value.
    #[error("hash mismatch for {path}")]
    HashMismatch {
        /// The uploaded path.
        path: String,
    },

    /// An upload has no listing entry.
    #[error("upload {path} is not in the listing")]
    UnlistedUpload {
        /// The uploaded path.
        path: String,
    },

    /// A listed file was not uploaded and is not stored.
    #[error("missing blob {hash} for {path}")]
    MissingBlob {
        /// The listed path.
        path: String,
        /// The hash the listing declared.
        hash: String,
    },

    /// The request body could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The application metadata file is invalid.
    #[error("invalid metadata: {0}")]
    Metadata(String),

    /// A file in a platform icon directory is not a PNG image.
    #[error("unsupported icon {path}")]
    UnsupportedIcon {
        /// The listed path.
        path: String,
    },

    /// The application has never been pushed.
    #[error("unknown application: {0}")]
    UnknownApplication(AppId),

    /// The application exists but has no files.
    #[error("application {0} has not been pushed")]
    NotPushed(AppId),

    /// The submission id is taken.
    #[error("duplicate submission: {0}")]
    DuplicateSubmission(SubmissionId),

    /// The submit form names a different submission than the handshake.
    #[error("submission id does not match the handshake")]
    SubmissionMismatch,

    /// The submission does not exist, or belongs to another application.
    #[error("submission not found: {0}")]
    SubmissionNotFound(SubmissionId),

    /// A referenced blob is absent from storage.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Stored data failed verification.
    #[error("corrupted data: {0}")]
    Corrupted(String),

    /// No endpoint matches the path.
    #[error("no route for {0}")]
    RouteNotFound(String),

    /// The endpoint does not accept this method.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        /// The request method.
        method: String,
        /// The request path.
        path: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::Unauthorized(_) => 401,
            ServerError::MalformedPayload(_)
            | ServerError::Metadata(_)
            | ServerError::UnsupportedIcon { .. }
            | ServerError::UnknownApplication(_)
            | ServerError::NotPushed(_)
            | ServerError::DuplicateSubmission(_)
            | ServerError::SubmissionMismatch => 400,
            ServerError::SubmissionNotFound(_) | ServerError::RouteNotFound(_) => 404,
            ServerError::MethodNotAllowed { .. } => 405,
            ServerError::PathSecurity(_)
            | ServerError::HashMismatch { .. }
            | ServerError::UnlistedUpload { .. }
            | ServerError::MissingBlob { .. }
            | ServerError::BlobNotFound(_)
            | ServerError::Corrupted(_)
            | ServerError::Storage(_)
            | ServerError::Internal(_) => 500,
        }
    }

    /// Returns the body sent to the client.
    ///
    /// Server errors are reduced to a fixed message; their detail only goes
    /// to the log.
    pub fn public_message(&self) -> String {
        match self {
            ServerError::Unauthorized(failure) => failure.message().to_string(),
            ServerError::MalformedPayload(_) => "Malformed payload.".to_string(),
            ServerError::Metadata(reason) => format!("[ERROR] {reason}"),
            ServerError::UnsupportedIcon { path } => format!(
                "[ERROR] Unsupported icon {path} detected. All icons must be PNG images."
            ),
            ServerError::UnknownApplication(_) => "App ID does not exist.".to_string(),
            ServerError::NotPushed(_) => "This app has not been pushed yet.".to_string(),
            ServerError::DuplicateSubmission(_) => "Submission ID already exists.".to_string(),
            ServerError::SubmissionMismatch => {
                "Submission ID does not match the handshake.".to_string()
            }
            ServerError::SubmissionNotFound(_) => "Submission not found.".to_string(),
            ServerError::RouteNotFound(_) => "Not found.".to_string(),
            ServerError::MethodNotAllowed { .. } => "Method not allowed.".to_string(),
            _ => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }

    /// Returns true for faults that indicate a hostile or broken client
    /// rather than a storage problem.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            ServerError::PathSecurity(_)
                | ServerError::HashMismatch { .. }
                | ServerError::UnlistedUpload { .. }
                | ServerError::MissingBlob { .. }
        )
    }
}

impl From<AuthFailure> for ServerError {
    fn from(failure: AuthFailure) -> Self {
        ServerError::Unauthorized(failure)
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnsafePath { .. } => ServerError::PathSecurity(err.to_string()),
            ProtocolError::MalformedToken(_) => {
                ServerError::Unauthorized(AuthFailure::MalformedToken)
            }
            other => ServerError::MalformedPayload(other.to_string()),
        }
    }
}
