//! Main sync server.

use crate::auth::HandshakeSigner;
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{Credentials, GcReport, HandlerContext, RequestHandler};
use crate::push::PushReport;
use crate::router::{Request, Response, Router};
use crate::submission::Submission;
use appvault_protocol::{AppId, HashesResponse, SubmissionId};
use appvault_storage::{DirectoryBackend, InMemoryBackend, KeyValueBackend};
use std::sync::Arc;
use tracing::info;

/// The sync server.
///
/// Owns the stores and exposes both a routed entry point for transports
/// ([`handle`](Self::handle)) and typed `handle_*` methods.
///
/// # Example
///
/// ```
/// use appvault_server::{Request, ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::new(b"secret".to_vec()));
/// let response = server.handle(&Request::get("/healthcheck/"));
/// assert_eq!(response.status, 200);
/// ```
pub struct SyncServer {
    handler: Arc<RequestHandler>,
    router: Router,
}

impl SyncServer {
    /// Creates a sync server over an in-memory backend.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_backend(config, Arc::new(InMemoryBackend::new()))
    }

    /// Creates a sync server over `backend`.
    pub fn with_backend(config: ServerConfig, backend: Arc<dyn KeyValueBackend>) -> Self {
        let context = Arc::new(HandlerContext::new(config, backend));
        let handler = Arc::new(RequestHandler::new(context));
        let router = Router::new(Arc::clone(&handler));
        Self { handler, router }
    }

    /// Creates a sync server over the configured data directory, or memory
    /// when none is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        match config.data_dir.clone() {
            Some(dir) => {
                let backend = DirectoryBackend::open(&dir)?;
                info!(data_dir = %dir.display(), "opened directory storage");
                Ok(Self::with_backend(config, Arc::new(backend)))
            }
            None => Ok(Self::new(config)),
        }
    }

    /// Routes a request.
    pub fn handle(&self, request: &Request) -> Response {
        self.router.dispatch(request)
    }

    /// Returns the current manifest of `app_id`.
    pub fn handle_get_hashes(
        &self,
        app_id: &AppId,
        credentials: &Credentials,
    ) -> ServerResult<HashesResponse> {
        self.handler.handle_get_hashes(app_id, credentials)
    }

    /// Applies a push archive.
    pub fn handle_push(
        &self,
        app_id: &AppId,
        credentials: &Credentials,
        body: &[u8],
    ) -> ServerResult<PushReport> {
        self.handler.handle_push(app_id, credentials, body)
    }

    /// Assembles a pull bundle.
    pub fn handle_pull(
        &self,
        app_id: &AppId,
        credentials: &Credentials,
        submission_id: Option<&SubmissionId>,
        body: &[u8],
    ) -> ServerResult<Vec<u8>> {
        self.handler
            .handle_pull(app_id, credentials, submission_id, body)
    }

    /// Creates a submission.
    pub fn handle_submit(
        &self,
        app_id: &AppId,
        credentials: &Credentials,
        body: &[u8],
    ) -> ServerResult<Submission> {
        self.handler.handle_submit(app_id, credentials, body)
    }

    /// Deletes unreferenced blobs.
    pub fn collect_garbage(&self) -> ServerResult<GcReport> {
        self.handler.collect_garbage()
    }

    /// Returns a signer using this server's secret.
    pub fn signer(&self) -> HandshakeSigner {
        HandshakeSigner::new(self.context().config.auth.secret.clone())
    }

    /// Returns the shared stores.
    pub fn context(&self) -> &Arc<HandlerContext> {
        self.handler.context()
    }
}
