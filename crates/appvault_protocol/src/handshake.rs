//! Handshake token payloads.
//!
//! A token is a JSON object encoded with standard base64. It travels in the
//! `handshake_token` query parameter next to a signature over the encoded
//! string; signing and verification are the server's concern.

use crate::error::{ProtocolError, ProtocolResult};
use crate::path::{AppId, SubmissionId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The verb a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Read or replace the live manifest.
    Push,
    /// Download assets and sources.
    Pull,
    /// Freeze the live manifest as a submission.
    Submit,
}

impl Action {
    /// Returns the wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Push => "push",
            Action::Pull => "pull",
            Action::Submit => "submit",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a token was issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenScope {
    /// A developer working on the live manifest.
    Development {
        /// The developer's user id.
        user_id: String,
    },
    /// A production client bound to one submission.
    Production {
        /// The submission the token is bound to.
        submission_id: SubmissionId,
    },
}

impl TokenScope {
    /// Returns true for production tokens.
    pub fn is_production(&self) -> bool {
        matches!(self, TokenScope::Production { .. })
    }
}

/// The decoded payload of a handshake token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeToken {
    /// The action being authorized.
    pub action: Action,
    /// The application the action applies to.
    pub app_id: String,
    /// Set on development tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Set on production tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    /// Issue time in seconds since the Unix epoch.
    pub issued_at: u64,
}

impl HandshakeToken {
    /// Creates a development token.
    pub fn development(
        action: Action,
        app_id: impl Into<String>,
        user_id: impl Into<String>,
        issued_at: u64,
    ) -> Self {
        Self {
            action,
            app_id: app_id.into(),
            user_id: Some(user_id.into()),
            submission_id: None,
            issued_at,
        }
    }

    /// Creates a production token.
    pub fn production(
        action: Action,
        app_id: impl Into<String>,
        submission_id: impl Into<String>,
        issued_at: u64,
    ) -> Self {
        Self {
            action,
            app_id: app_id.into(),
            user_id: None,
            submission_id: Some(submission_id.into()),
            issued_at,
        }
    }

    /// Encodes the token as base64 JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self) -> ProtocolResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decodes a token from its base64 JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedToken`] on bad base64 or JSON.
    pub fn decode(encoded: &str) -> ProtocolResult<Self> {
        let json = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ProtocolError::MalformedToken(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| ProtocolError::MalformedToken(e.to_string()))
    }

    /// Resolves which flavour of token this is.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedToken`] unless exactly one of
    /// `user_id` and `submission_id` is present and non-empty.
    pub fn scope(&self) -> ProtocolResult<TokenScope> {
        let user = self.user_id.as_deref().filter(|s| !s.is_empty());
        let submission = self.submission_id.as_deref().filter(|s| !s.is_empty());
        match (user, submission) {
            (Some(user_id), None) => Ok(TokenScope::Development {
                user_id: user_id.to_string(),
            }),
            (None, Some(id)) => Ok(TokenScope::Production {
                submission_id: SubmissionId::parse(id)
                    .map_err(|_| ProtocolError::MalformedToken("invalid submission id".into()))?,
            }),
            (Some(_), Some(_)) => Err(ProtocolError::MalformedToken(
                "both user_id and submission_id set".into(),
            )),
            (None, None) => Err(ProtocolError::MalformedToken(
                "neither user_id nor submission_id set".into(),
            )),
        }
    }

    /// Returns true if the token names `app_id`.
    pub fn is_for(&self, app_id: &AppId) -> bool {
        self.app_id == app_id.as_str()
    }
}
