//! Frozen submissions.

use crate::auth::unix_now;
use crate::error::{ServerError, ServerResult};
use crate::record;
use appvault_protocol::{AppId, Manifest, SubmissionId};
use appvault_storage::KeyValueBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const SUBMISSION_PREFIX: &str = "submissions/";

/// A write-once copy of an application's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// The application the manifest was copied from.
    pub app_id: AppId,
    /// Globally unique id.
    pub submission_id: SubmissionId,
    /// The manifest at creation time.
    pub manifest: Manifest,
    /// Creation time in seconds since the Unix epoch.
    pub created_at: u64,
}

/// Stores submissions. There is no update or delete.
pub struct SubmissionStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl SubmissionStore {
    /// Creates a submission store over `backend`.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    fn key(id: &SubmissionId) -> String {
        format!("{SUBMISSION_PREFIX}{id}")
    }

    /// Returns true if `id` is taken by any application.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend lookup fails.
    pub fn exists(&self, id: &SubmissionId) -> ServerResult<bool> {
        Ok(self.backend.exists(&Self::key(id))?)
    }

    /// Freezes `manifest` as submission `id` of `app_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DuplicateSubmission`] if the id is taken,
    /// including by a concurrent call.
    pub fn create(
        &self,
        app_id: &AppId,
        id: &SubmissionId,
        manifest: Manifest,
    ) -> ServerResult<Submission> {
        let submission = Submission {
            app_id: app_id.clone(),
            submission_id: id.clone(),
            manifest,
            created_at: unix_now(),
        };
        let bytes = record::encode(&submission)?;
        if !self.backend.put_if_absent(&Self::key(id), &bytes)? {
            return Err(ServerError::DuplicateSubmission(id.clone()));
        }
        info!(
            app_id = %app_id,
            submission_id = %id,
            files = submission.manifest.len(),
            "submission created"
        );
        Ok(submission)
    }

    /// Returns submission `id`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or the record is damaged.
    pub fn get(&self, id: &SubmissionId) -> ServerResult<Option<Submission>> {
        let key = Self::key(id);
        match self.backend.get(&key)? {
            Some(bytes) => Ok(Some(record::decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns submission `id` if it belongs to `app_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::SubmissionNotFound`] if it does not exist or
    /// belongs to another application.
    pub fn get_for_app(&self, app_id: &AppId, id: &SubmissionId) -> ServerResult<Submission> {
        match self.get(id)? {
            Some(submission) if submission.app_id == *app_id => Ok(submission),
            _ => Err(ServerError::SubmissionNotFound(id.clone())),
        }
    }

    /// Lists every submission id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend listing fails.
    pub fn ids(&self) -> ServerResult<Vec<SubmissionId>> {
        Ok(self
            .backend
            .keys(SUBMISSION_PREFIX)?
            .iter()
            .filter_map(|key| key.strip_prefix(SUBMISSION_PREFIX))
            .filter_map(|id| SubmissionId::parse(id).ok())
            .collect())
    }
}
