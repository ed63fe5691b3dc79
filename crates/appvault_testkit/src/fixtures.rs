//! Test fixtures and server helpers.
//!
//! Provides a ready-to-use server with a known secret, handshake minting,
//! and request shortcuts for every endpoint.

use appvault_protocol::{
    Action, AppId, ContentHash, HandshakeToken, PullBundle, PullRequest, PushArchiveBuilder,
    SubmitForm, SubmissionId,
};
use appvault_server::{unix_now, Credentials, Request, Response, ServerConfig, SyncServer};
use appvault_storage::InMemoryBackend;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Secret used by every test server.
pub const TEST_SECRET: &[u8] = b"appvault-test-secret";

/// User id carried by development handshakes.
pub const TEST_USER: &str = "test-user";

/// A test server with automatic cleanup.
pub struct TestServer {
    /// The server instance, shareable across threads.
    pub server: Arc<SyncServer>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestServer {
    /// Creates a server over in-memory storage.
    pub fn memory() -> Self {
        Self::with_config(Self::config())
    }

    /// Creates a server with a custom configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            server: Arc::new(SyncServer::new(config)),
            _temp_dir: None,
        }
    }

    /// Creates a server over `backend`, which the caller keeps to observe
    /// storage traffic.
    pub fn with_backend(backend: Arc<InMemoryBackend>) -> Self {
        Self {
            server: Arc::new(SyncServer::with_backend(Self::config(), backend)),
            _temp_dir: None,
        }
    }

    /// Creates a server over a temporary directory.
    pub fn directory() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Self::config().with_data_dir(temp_dir.path());
        Self {
            server: Arc::new(SyncServer::open(config).expect("Failed to open directory server")),
            _temp_dir: Some(temp_dir),
        }
    }

    /// The configuration every test server starts from.
    pub fn config() -> ServerConfig {
        ServerConfig::new(TEST_SECRET.to_vec())
    }

    /// `GET /push/{app}/` with a development handshake.
    pub fn get_hashes(&self, app: &str) -> Response {
        self.server.handle(&Request::get(&format!(
            "/push/{app}/?{}",
            dev_query(Action::Push, app)
        )))
    }

    /// Returns the live manifest as path → hash strings.
    pub fn hashes(&self, app: &str) -> BTreeMap<String, String> {
        let response = self.get_hashes(app);
        assert_eq!(response.status, 200, "{}", response.text_body());
        let json: serde_json::Value =
            serde_json::from_slice(&response.body).expect("hashes response is JSON");
        json["hashes"]
            .as_object()
            .expect("hashes is an object")
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
            .collect()
    }

    /// `POST /push/{app}/` with a development handshake.
    pub fn push(&self, app: &str, archive: Vec<u8>) -> Response {
        self.server.handle(&Request::post(
            &format!("/push/{app}/?{}", dev_query(Action::Push, app)),
            archive,
        ))
    }

    /// Pushes `files` in full.
    pub fn push_files(&self, app: &str, files: &[(&str, &[u8])]) -> Response {
        self.push(app, push_archive(files))
    }

    /// `POST /pull/{app}/` with a development handshake.
    pub fn pull(&self, app: &str, asset_hashes: &[(&str, &[u8])]) -> Response {
        self.server.handle(&Request::post(
            &format!("/pull/{app}/?{}", dev_query(Action::Pull, app)),
            pull_body(asset_hashes),
        ))
    }

    /// `POST /pull/{app}/?submission_id=...` with a production handshake.
    pub fn pull_submission(
        &self,
        app: &str,
        submission: &str,
        asset_hashes: &[(&str, &[u8])],
    ) -> Response {
        self.server.handle(&Request::post(
            &format!(
                "/pull/{app}/?submission_id={submission}&{}",
                prod_query(Action::Pull, app, submission)
            ),
            pull_body(asset_hashes),
        ))
    }

    /// `POST /submit/{app}/` with a matching production handshake.
    pub fn submit(&self, app: &str, submission: &str) -> Response {
        let form = SubmitForm {
            submission_id: SubmissionId::parse(submission).expect("valid submission id"),
        };
        self.server.handle(&Request::post(
            &format!("/submit/{app}/?{}", prod_query(Action::Submit, app, submission)),
            form.encode(),
        ))
    }
}

impl std::ops::Deref for TestServer {
    type Target = SyncServer;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

/// Mints a development handshake query string.
pub fn dev_query(action: Action, app: &str) -> String {
    sign(&HandshakeToken::development(action, app, TEST_USER, unix_now()))
}

/// Mints a production handshake query string.
pub fn prod_query(action: Action, app: &str, submission: &str) -> String {
    sign(&HandshakeToken::production(action, app, submission, unix_now()))
}

/// Signs any token with [`TEST_SECRET`] and renders it as a query string.
pub fn sign(token: &HandshakeToken) -> String {
    appvault_server::HandshakeSigner::new(TEST_SECRET.to_vec())
        .sign(token)
        .expect("Failed to sign token")
        .query()
}

/// Development credentials for the typed server API.
pub fn dev_credentials(action: Action, app: &str) -> Credentials {
    let signed = appvault_server::HandshakeSigner::new(TEST_SECRET.to_vec())
        .sign(&HandshakeToken::development(action, app, TEST_USER, unix_now()))
        .expect("Failed to sign token");
    Credentials::new(signed.token, signed.signature)
}

/// Builds a push archive uploading every file.
pub fn push_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    files
        .iter()
        .fold(PushArchiveBuilder::new(), |builder, (path, content)| {
            builder.file(path, content).expect("valid path")
        })
        .build()
        .expect("Failed to build archive")
}

/// Builds a pull request body from `(key, content)` pairs.
pub fn pull_body(asset_hashes: &[(&str, &[u8])]) -> Vec<u8> {
    PullRequest {
        asset_hashes: asset_hashes
            .iter()
            .map(|(key, content)| (key.to_string(), ContentHash::of(content).to_string()))
            .collect(),
    }
    .to_json()
    .expect("Failed to encode pull request")
}

/// Decodes a successful pull response.
pub fn decode_bundle(response: &Response) -> PullBundle {
    assert_eq!(response.status, 200, "{}", response.text_body());
    PullBundle::from_zip(&response.body).expect("Failed to decode bundle")
}

/// Parses an app id, panicking on invalid input.
pub fn app_id(id: &str) -> AppId {
    AppId::parse(id).expect("valid app id")
}

/// Test scenario helpers.
pub mod scenarios {
    /// Content of the sample app's metadata file.
    pub const SAMPLE_APPFILE: &[u8] = br#"{"base_version": "0.45", "display_name": "Sample"}"#;

    /// A small application: two sources, a hidden file, metadata and an
    /// image asset.
    pub fn sample_app() -> Vec<(&'static str, &'static [u8])> {
        vec![
            ("index.ios.js", &b"import App from './components/App';\n"[..]),
            (
                "components/AnimatedProgressView.js",
                &b"export default function AnimatedProgressView() {}\n"[..],
            ),
            (".babelrc", &b"{\"presets\": [\"react-native\"]}\n"[..]),
            ("Appfile", SAMPLE_APPFILE),
            ("images/landscape.png", &b"\x89PNG\r\n\x1a\nlandscape"[..]),
        ]
    }
}
