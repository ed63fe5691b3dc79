//! Transport-agnostic request routing.
//!
//! The router maps a method, path, query string and body to a status, a
//! content type and a body. Binding it to a socket is left to the embedder.
//!
//! | Method | Path                 | Handshake            |
//! |--------|----------------------|----------------------|
//! | GET    | `/push/{app_id}/`    | development `push`   |
//! | POST   | `/push/{app_id}/`    | development `push`   |
//! | POST   | `/pull/{app_id}/`    | `pull`               |
//! | POST   | `/submit/{app_id}/`  | production `submit`  |
//! | GET    | `/healthcheck/`      | none                 |
//!
//! Every path may carry a `/v1` prefix, and the trailing slash is optional.

use crate::error::{ServerError, ServerResult};
use crate::handler::{Credentials, RequestHandler};
use appvault_protocol::{form_field, AppId, SubmissionId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// `text/plain` content type.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
/// `application/json` content type.
pub const APPLICATION_JSON: &str = "application/json";
/// `application/zip` content type.
pub const APPLICATION_ZIP: &str = "application/zip";

/// Request methods the router distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// Anything else.
    Other(String),
}

impl Method {
    /// Parses a method name, ignoring ASCII case.
    pub fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case("GET") {
            Method::Get
        } else if name.eq_ignore_ascii_case("POST") {
            Method::Post
        } else {
            Method::Other(name.to_ascii_uppercase())
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
            Method::Other(name) => f.write_str(name),
        }
    }
}

/// An incoming request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: String,
    /// Request body.
    pub body: Vec<u8>,
}

impl Request {
    /// Creates a request. A `?` in `target` splits path and query.
    pub fn new(method: Method, target: &str, body: Vec<u8>) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            body,
        }
    }

    /// Creates a `GET` request.
    pub fn get(target: &str) -> Self {
        Self::new(Method::Get, target, Vec::new())
    }

    /// Creates a `POST` request.
    pub fn post(target: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::Post, target, body.into())
    }

    fn query_param(&self, name: &str) -> Option<String> {
        form_field(self.query.as_bytes(), name)
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            token: self.query_param("handshake_token"),
            signature: self.query_param("handshake_signature"),
        }
    }
}

/// A response ready to be written by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header.
    pub content_type: &'static str,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: TEXT_PLAIN,
            body: body.into().into_bytes(),
        }
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl From<&ServerError> for Response {
    fn from(err: &ServerError) -> Self {
        Response::text(err.status(), err.public_message())
    }
}

/// A matched endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Push(String),
    Pull(String),
    Submit(String),
    Healthcheck,
}

impl Route {
    fn parse(path: &str) -> Option<Self> {
        let path = path.strip_prefix("/v1").unwrap_or(path);
        let path = path.strip_prefix('/')?;
        let path = path.strip_suffix('/').unwrap_or(path);
        let mut segments = path.split('/');
        let route = match (segments.next()?, segments.next(), segments.next()) {
            ("healthcheck", None, None) => Route::Healthcheck,
            ("push", Some(app), None) => Route::Push(app.to_string()),
            ("pull", Some(app), None) => Route::Pull(app.to_string()),
            ("submit", Some(app), None) => Route::Submit(app.to_string()),
            _ => return None,
        };
        Some(route)
    }
}

/// Dispatches requests to a [`RequestHandler`].
pub struct Router {
    handler: Arc<RequestHandler>,
}

impl Router {
    /// Creates a router over `handler`.
    pub fn new(handler: Arc<RequestHandler>) -> Self {
        Self { handler }
    }

    /// Handles one request. Never fails: errors become responses.
    pub fn dispatch(&self, request: &Request) -> Response {
        match self.route(request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    error!(
                        method = %request.method,
                        path = %request.path,
                        integrity = err.is_integrity_fault(),
                        error = %err,
                        "request failed"
                    );
                } else if err.status() == 401 {
                    warn!(method = %request.method, path = %request.path, error = %err, "request refused");
                } else {
                    debug!(method = %request.method, path = %request.path, error = %err, "request rejected");
                }
                Response::from(&err)
            }
        }
    }

    fn route(&self, request: &Request) -> ServerResult<Response> {
        let route = Route::parse(&request.path)
            .ok_or_else(|| ServerError::RouteNotFound(request.path.clone()))?;
        let not_allowed = || ServerError::MethodNotAllowed {
            method: request.method.to_string(),
            path: request.path.clone(),
        };
        let handler = &self.handler;

        match (&route, &request.method) {
            (Route::Healthcheck, Method::Get) => {
                Ok(Response::text(200, handler.handle_healthcheck()?))
            }
            (Route::Push(app), Method::Get) => {
                let app_id = parse_app(app)?;
                let hashes = handler.handle_get_hashes(&app_id, &request.credentials())?;
                Ok(Response::ok(APPLICATION_JSON, hashes.to_json()?))
            }
            (Route::Push(app), Method::Post) => {
                let app_id = parse_app(app)?;
                let report = handler.handle_push(&app_id, &request.credentials(), &request.body)?;
                Ok(Response::text(200, report.render()))
            }
            (Route::Pull(app), Method::Post) => {
                let app_id = parse_app(app)?;
                let submission_id = request
                    .query_param("submission_id")
                    .filter(|id| !id.is_empty())
                    .map(|id| SubmissionId::parse(&id))
                    .transpose()?;
                let bundle = handler.handle_pull(
                    &app_id,
                    &request.credentials(),
                    submission_id.as_ref(),
                    &request.body,
                )?;
                Ok(Response::ok(APPLICATION_ZIP, bundle))
            }
            (Route::Submit(app), Method::Post) => {
                let app_id = parse_app(app)?;
                let submission =
                    handler.handle_submit(&app_id, &request.credentials(), &request.body)?;
                Ok(Response::text(
                    200,
                    format!("Submission {} created.", submission.submission_id),
                ))
            }
            _ => Err(not_allowed()),
        }
    }
}

/// An app id that cannot be a storage key cannot name a pushed app.
fn parse_app(raw: &str) -> ServerResult<AppId> {
    AppId::parse(raw).map_err(|_| ServerError::RouteNotFound(raw.to_string()))
}
