//! Request and response bodies.

use crate::error::{ProtocolError, ProtocolResult};
use crate::manifest::Manifest;
use crate::path::SubmissionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response to `GET /push/{app_id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashesResponse {
    /// The application's live manifest.
    pub hashes: Manifest,
}

impl HashesResponse {
    /// Serializes the response.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Body of `POST /pull/{app_id}/`.
///
/// Keys are asset keys (`images/<path>`), or plain paths for source files
/// when the server delivers sources incrementally. Values are whatever the
/// client computed; they are only compared, never trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Hashes the client already holds.
    pub asset_hashes: BTreeMap<String, String>,
}

impl PullRequest {
    /// Parses a request body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] if the body is not an object with an
    /// `asset_hashes` object of strings.
    pub fn from_json(body: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Serializes the request.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Returns the hash the client holds for `key`.
    pub fn hash_for(&self, key: &str) -> Option<&str> {
        self.asset_hashes.get(key).map(String::as_str)
    }
}

/// Form body of `POST /submit/{app_id}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitForm {
    /// The id to create.
    pub submission_id: SubmissionId,
}

impl SubmitForm {
    /// Parses an `application/x-www-form-urlencoded` body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] if `submission_id` is absent
    /// or empty, or [`ProtocolError::InvalidIdentifier`] if it is malformed.
    pub fn parse(body: &[u8]) -> ProtocolResult<Self> {
        let raw = form_field(body, "submission_id")
            .filter(|v| !v.is_empty())
            .ok_or(ProtocolError::MissingField("submission_id"))?;
        Ok(Self {
            submission_id: SubmissionId::parse(&raw)?,
        })
    }

    /// Encodes the form.
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("submission_id", self.submission_id.as_str())
            .finish()
    }
}

/// Returns the first value of `name` in a URL-encoded form or query string.
pub fn form_field(input: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
