//! Request handlers for the push, pull and submit endpoints.

use crate::auth::{AuthContext, HandshakeValidator};
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::error::{AuthFailure, ServerError, ServerResult};
use crate::manifest_store::ManifestStore;
use crate::pull::PullAssembler;
use crate::push::{PushIngestor, PushReport};
use crate::submission::{Submission, SubmissionStore};
use appvault_protocol::{
    Action, AppId, ContentHash, HashesResponse, PullRequest, SubmissionId, SubmitForm, TokenScope,
};
use appvault_storage::KeyValueBackend;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Body returned by a passing health check.
pub const HEALTHCHECK_PASSED: &str = "Passed.";

/// The handshake parameters of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// `handshake_token` query parameter.
    pub token: Option<String>,
    /// `handshake_signature` query parameter.
    pub signature: Option<String>,
}

impl Credentials {
    /// Creates credentials from both parameters.
    pub fn new(token: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            signature: Some(signature.into()),
        }
    }
}

/// Outcome of a garbage collection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Distinct hashes referenced by manifests and submissions.
    pub referenced: usize,
    /// Blobs deleted.
    pub removed: usize,
}

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Blob storage.
    pub blobs: Arc<BlobStore>,
    /// Live manifests.
    pub manifests: Arc<ManifestStore>,
    /// Frozen submissions.
    pub submissions: Arc<SubmissionStore>,
    /// Held shared by pushes and pulls, exclusively by garbage collection.
    gc_gate: Arc<RwLock<()>>,
}

impl HandlerContext {
    /// Creates a handler context with every store over `backend`.
    pub fn new(config: ServerConfig, backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            config,
            blobs: Arc::new(BlobStore::new(Arc::clone(&backend))),
            manifests: Arc::new(ManifestStore::new(Arc::clone(&backend))),
            submissions: Arc::new(SubmissionStore::new(backend)),
            gc_gate: Arc::new(RwLock::new(())),
        }
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
    validator: HandshakeValidator,
    ingestor: PushIngestor,
    assembler: PullAssembler,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        let validator = HandshakeValidator::new(context.config.auth.clone());
        let ingestor = PushIngestor::new(
            Arc::clone(&context.blobs),
            Arc::clone(&context.manifests),
            Arc::clone(&context.gc_gate),
        );
        let assembler = PullAssembler::new(Arc::clone(&context.blobs), context.config.clone());
        Self {
            context,
            validator,
            ingestor,
            assembler,
        }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    fn authorize(
        &self,
        credentials: &Credentials,
        action: Action,
        app_id: &AppId,
    ) -> ServerResult<AuthContext> {
        let (Some(token), Some(signature)) = (&credentials.token, &credentials.signature) else {
            return Err(AuthFailure::MissingHandshake.into());
        };
        let auth = self.validator.validate(token, signature, action, app_id);
        if let Err(err) = &auth {
            debug!(app_id = %app_id, action = %action, error = %err, "handshake rejected");
        }
        auth
    }

    /// Handles `GET /push/{app_id}/`: the live manifest.
    pub fn handle_get_hashes(
        &self,
        app_id: &AppId,
        credentials: &Credentials,
    ) -> ServerResult<HashesResponse> {
        self.authorize(credentials, Action::Push, app_id)?;
        Ok(HashesResponse {
            hashes: self.context.manifests.get_hashes(app_id)?,
        })
    }

    /// Handles `POST /push/{app_id}/`.
    pub fn handle_push(
        &self,
        app_id: &AppId,
        credentials: &Credentials,
        body: &[u8],
    ) -> ServerResult<PushReport> {
        self.authorize(credentials, Action::Push, app_id)?;
        self.ingestor.ingest(app_id, body)
    }

    /// Handles `POST /pull/{app_id}/`.
    ///
    /// Development handshakes pull the live manifest. Production handshakes
    /// pull their own submission; a `submission_id` query parameter must
    /// name that same submission. An empty source is refused either way.
    ///
    /// Garbage collection waits until the bundle is assembled.
    pub fn handle_pull(
        &self,
        app_id: &AppId,
        credentials: &Credentials,
        submission_id: Option<&SubmissionId>,
        body: &[u8],
    ) -> ServerResult<Vec<u8>> {
        let auth = self.authorize(credentials, Action::Pull, app_id)?;
        let request = PullRequest::from_json(body)?;
        let _gate = self.context.gc_gate.read();

        let source = match (&auth.scope, submission_id) {
            (TokenScope::Production { submission_id: bound }, requested) => {
                if requested.is_some_and(|id| id != bound) {
                    return Err(AuthFailure::SubmissionMismatch.into());
                }
                self.context
                    .submissions
                    .get_for_app(app_id, bound)?
                    .manifest
            }
            (TokenScope::Development { .. }, Some(_)) => {
                return Err(AuthFailure::SubmissionMismatch.into());
            }
            (TokenScope::Development { .. }, None) => self.context.manifests.get_hashes(app_id)?,
        };
        if source.is_empty() {
            return Err(ServerError::NotPushed(app_id.clone()));
        }

        let bundle = self.assembler.assemble(&source, &request)?;
        info!(
            app_id = %app_id,
            submission = auth.scope.is_production(),
            bytes = bundle.len(),
            "pull served"
        );
        Ok(bundle)
    }

    /// Handles `POST /submit/{app_id}/`.
    pub fn handle_submit(
        &self,
        app_id: &AppId,
        credentials: &Credentials,
        body: &[u8],
    ) -> ServerResult<Submission> {
        let auth = self.authorize(credentials, Action::Submit, app_id)?;
        let form = SubmitForm::parse(body)?;
        let submissions = &self.context.submissions;

        if submissions.exists(&form.submission_id)? {
            return Err(ServerError::DuplicateSubmission(form.submission_id));
        }
        if !self.context.manifests.exists(app_id)? {
            return Err(ServerError::UnknownApplication(app_id.clone()));
        }
        match &auth.scope {
            TokenScope::Production { submission_id } if *submission_id == form.submission_id => {}
            _ => return Err(ServerError::SubmissionMismatch),
        }

        let lock = self.context.manifests.app_lock(app_id);
        let _guard = lock.lock();
        let snapshot = self.context.manifests.get_hashes(app_id)?;
        submissions.create(app_id, &form.submission_id, snapshot)
    }

    /// Handles `GET /healthcheck/`: a blob write and read round trip.
    pub fn handle_healthcheck(&self) -> ServerResult<&'static str> {
        let probe = b"appvault healthcheck";
        let hash = self.context.blobs.put(probe)?;
        if self.context.blobs.get(&hash)? != probe {
            return Err(ServerError::Corrupted("healthcheck blob".into()));
        }
        Ok(HEALTHCHECK_PASSED)
    }

    /// Deletes blobs no manifest or submission references.
    ///
    /// Pushes and pulls wait while this runs.
    pub fn collect_garbage(&self) -> ServerResult<GcReport> {
        let _gate = self.context.gc_gate.write();

        let mut referenced: BTreeSet<ContentHash> = BTreeSet::new();
        for app_id in self.context.manifests.apps()? {
            let manifest = self.context.manifests.get_hashes(&app_id)?;
            referenced.extend(manifest.hashes().into_iter().cloned());
        }
        for id in self.context.submissions.ids()? {
            if let Some(submission) = self.context.submissions.get(&id)? {
                referenced.extend(submission.manifest.hashes().into_iter().cloned());
            }
        }
        // Keeps the healthcheck probe from being collected and rewritten.
        referenced.insert(ContentHash::of(b"appvault healthcheck"));

        let removed = self.context.blobs.collect_garbage(&referenced)?;
        Ok(GcReport {
            referenced: referenced.len(),
            removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{unix_now, HandshakeSigner};
    use appvault_protocol::{HandshakeToken, PushArchiveBuilder};
    use appvault_storage::InMemoryBackend;

    const SECRET: &[u8] = b"handler-secret";

    fn create_handler() -> RequestHandler {
        let config = ServerConfig::new(SECRET.to_vec());
        let context = Arc::new(HandlerContext::new(config, Arc::new(InMemoryBackend::new())));
        RequestHandler::new(context)
    }

    fn dev(action: Action, app: &str) -> Credentials {
        let signed = HandshakeSigner::new(SECRET.to_vec())
            .sign(&HandshakeToken::development(action, app, "dev", unix_now()))
            .unwrap();
        Credentials::new(signed.token, signed.signature)
    }

    fn prod(action: Action, app: &str, submission: &str) -> Credentials {
        let signed = HandshakeSigner::new(SECRET.to_vec())
            .sign(&HandshakeToken::production(action, app, submission, unix_now()))
            .unwrap();
        Credentials::new(signed.token, signed.signature)
    }

    fn app() -> AppId {
        AppId::parse("handler-app").unwrap()
    }

    fn push_one(handler: &RequestHandler) {
        let body = PushArchiveBuilder::new()
            .file("main.js", b"js")
            .unwrap()
            .build()
            .unwrap();
        handler
            .handle_push(&app(), &dev(Action::Push, "handler-app"), &body)
            .unwrap();
    }

    #[test]
    fn missing_handshake() {
        let handler = create_handler();
        let err = handler
            .handle_get_hashes(&app(), &Credentials::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Unauthorized(AuthFailure::MissingHandshake)
        ));
    }

    #[test]
    fn get_hashes_of_new_app() {
        let handler = create_handler();
        let response = handler
            .handle_get_hashes(&app(), &dev(Action::Push, "handler-app"))
            .unwrap();
        assert!(response.hashes.is_empty());
    }

    #[test]
    fn pull_before_push() {
        let handler = create_handler();
        let err = handler
            .handle_pull(
                &app(),
                &dev(Action::Pull, "handler-app"),
                None,
                br#"{"asset_hashes":{}}"#,
            )
            .unwrap_err();
        assert!(matches!(err, ServerError::NotPushed(_)));
    }

    #[test]
    fn pull_with_bad_body() {
        let handler = create_handler();
        push_one(&handler);
        let err = handler
            .handle_pull(&app(), &dev(Action::Pull, "handler-app"), None, b"{}")
            .unwrap_err();
        assert!(matches!(err, ServerError::MalformedPayload(_)));
    }

    #[test]
    fn submit_checks_in_order() {
        let handler = create_handler();
        let sub = |id: &str| format!("submission_id={id}");

        let err = handler
            .handle_submit(&app(), &prod(Action::Submit, "handler-app", "s1"), sub("s1").as_bytes())
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownApplication(_)));

        push_one(&handler);
        let err = handler
            .handle_submit(&app(), &prod(Action::Submit, "handler-app", "s1"), sub("s2").as_bytes())
            .unwrap_err();
        assert!(matches!(err, ServerError::SubmissionMismatch));

        handler
            .handle_submit(&app(), &prod(Action::Submit, "handler-app", "s1"), sub("s1").as_bytes())
            .unwrap();
        let err = handler
            .handle_submit(&app(), &prod(Action::Submit, "handler-app", "s1"), sub("s1").as_bytes())
            .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateSubmission(_)));
    }

    #[test]
    fn production_pull_uses_submission() {
        let handler = create_handler();
        push_one(&handler);
        handler
            .handle_submit(
                &app(),
                &prod(Action::Submit, "handler-app", "s1"),
                b"submission_id=s1",
            )
            .unwrap();

        let creds = prod(Action::Pull, "handler-app", "s1");
        let body = br#"{"asset_hashes":{}}"#;
        assert!(handler.handle_pull(&app(), &creds, None, body).is_ok());

        let s1 = SubmissionId::parse("s1").unwrap();
        assert!(handler.handle_pull(&app(), &creds, Some(&s1), body).is_ok());

        let s2 = SubmissionId::parse("s2").unwrap();
        let err = handler
            .handle_pull(&app(), &creds, Some(&s2), body)
            .unwrap_err();
        assert_eq!(err.status(), 401);

        let dev_creds = dev(Action::Pull, "handler-app");
        let err = handler
            .handle_pull(&app(), &dev_creds, Some(&s1), body)
            .unwrap_err();
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn healthcheck() {
        let handler = create_handler();
        assert_eq!(handler.handle_healthcheck().unwrap(), HEALTHCHECK_PASSED);
    }

    #[test]
    fn gc_keeps_live_blobs() {
        let handler = create_handler();
        handler.context().blobs.put(b"orphan").unwrap();
        push_one(&handler);

        let report = handler.collect_garbage().unwrap();
        assert_eq!(report.removed, 1);
        assert!(handler
            .context()
            .blobs
            .exists(&ContentHash::of(b"js"))
            .unwrap());
    }
}
