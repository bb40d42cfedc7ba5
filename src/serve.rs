//! HTTP server for the diagnosis store
//!
//! `diagnosis-store serve` → binds the listener and answers:
//!
//! | Method | Path | Result |
//! |--------|------|--------|
//! | `POST` | `/submit` | one row per response, `{"success": true}` |
//! | `GET` | `/results` | every record |
//! | `GET` | `/filter` | records matching `userId` / `studyId` |
//! | `GET` | `/export` | CSV attachment |
//! | `DELETE` | `/clear` | deletes every record |
//!
//! Any origin may call the API. Requests are handled one at a time.

use crate::config::Config;
use crate::db::{Database, DbError, RecordFilter, ResponseInput};
use crate::error::ApiError;
use crate::export::{attachment_disposition, records_to_csv};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, Server};
use uuid::Uuid;

const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
const CONTENT_TYPE_CSV: &str = "text/csv; charset=utf-8";
const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

const CORS_ALLOW_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

const EXPORT_FAILED: &str = "Error generating export.";
const CLEARED_MESSAGE: &str = "All data cleared";

// ============================================================================
// Request / Response Bodies
// ============================================================================

/// Body of `POST /submit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub user_id: String,
    pub study_id: String,
    pub responses: Vec<ResponseInput>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Transport-independent request and reply
// ============================================================================

/// What routing needs to know about an incoming request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub body: Vec<u8>,
    /// Value of `Access-Control-Request-Headers`, for preflight replies
    pub cors_request_headers: Option<String>,
}

impl ApiRequest {
    /// Build from a raw request target such as `/filter?userId=u1`
    pub fn new(method: Method, url: &str) -> Self {
        let (path, query) = split_url(url);
        Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            body: Vec::new(),
            cors_request_headers: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// A fully formed reply, converted to a tiny_http response at the edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiReply {
    fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status, CONTENT_TYPE_JSON, body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response");
                Self::text(500, &format!("Serialization error: {}", e))
            }
        }
    }

    fn text(status: u16, text: &str) -> Self {
        Self::new(status, CONTENT_TYPE_TEXT, text.as_bytes().to_vec())
    }

    fn error(err: &ApiError) -> Self {
        let status = err.status_code();
        if status >= 500 {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::warn!(error = %err, status, "request rejected");
        }
        Self::json(status, &err.body())
    }

    fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Value of the first header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let mut response = Response::from_data(self.body).with_status_code(self.status);
        for (name, value) in &self.headers {
            match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                Ok(header) => response.add_header(header),
                Err(()) => tracing::warn!(header = %name, "dropping invalid header"),
            }
        }
        response
    }
}

/// Split a request target into path and query, normalising a trailing slash
fn split_url(url: &str) -> (&str, &str) {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    };
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    (if path.is_empty() { "/" } else { path }, query)
}

// ============================================================================
// Routing
// ============================================================================

/// Dispatch one request against the store
///
/// Every reply carries `Access-Control-Allow-Origin: *`.
pub fn route(db: &Database, request: &ApiRequest) -> ApiReply {
    let result = match (&request.method, request.path.as_str()) {
        (&Method::Options, _) => Ok(preflight(request)),
        (&Method::Post, "/submit") => handle_submit(db, &request.body),
        (&Method::Get, "/results") => handle_results(db),
        (&Method::Get, "/filter") => handle_filter(db, &request.query),
        (&Method::Get, "/export") => Ok(handle_export(db)),
        (&Method::Delete, "/clear") => handle_clear(db),
        _ => Err(ApiError::NotFound),
    };

    result
        .unwrap_or_else(|e| ApiReply::error(&e))
        .with_header("Access-Control-Allow-Origin", "*")
}

fn preflight(request: &ApiRequest) -> ApiReply {
    let mut reply = ApiReply {
        status: 204,
        headers: Vec::new(),
        body: Vec::new(),
    }
    .with_header("Access-Control-Allow-Methods", CORS_ALLOW_METHODS);

    if let Some(requested) = &request.cors_request_headers {
        reply = reply
            .with_header("Access-Control-Allow-Headers", requested)
            .with_header("Vary", "Access-Control-Request-Headers");
    }
    reply
}

/// Parse and validate a submission without touching storage
pub fn parse_submission(body: &[u8]) -> Result<SubmitRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::MalformedRequest("empty request body".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::MalformedRequest(e.to_string()))
}

fn handle_submit(db: &Database, body: &[u8]) -> Result<ApiReply, ApiError> {
    let submission = parse_submission(body)?;

    let inserted =
        db.submit_responses(&submission.user_id, &submission.study_id, &submission.responses)?;
    tracing::info!(
        user_id = %submission.user_id,
        study_id = %submission.study_id,
        rows = inserted,
        "submission stored"
    );

    Ok(ApiReply::json(200, &SubmitResponse { success: true }))
}

fn handle_results(db: &Database) -> Result<ApiReply, ApiError> {
    let records = db.get_all_records()?;
    Ok(ApiReply::json(200, &records))
}

fn handle_filter(db: &Database, query: &str) -> Result<ApiReply, ApiError> {
    let filter: RecordFilter = serde_urlencoded::from_str(query)
        .map_err(|e| ApiError::MalformedRequest(format!("invalid query: {}", e)))?;
    let records = db.filter_records(&filter)?;
    tracing::debug!(?filter, rows = records.len(), "filter");
    Ok(ApiReply::json(200, &records))
}

/// CSV is built in memory per request, so concurrent exports never share a file
fn handle_export(db: &Database) -> ApiReply {
    match db.get_all_records() {
        Ok(records) => {
            let csv = records_to_csv(&records);
            tracing::info!(rows = records.len(), "export generated");
            ApiReply::new(200, CONTENT_TYPE_CSV, csv.into_bytes())
                .with_header("Content-Disposition", &attachment_disposition())
        }
        Err(e) => {
            tracing::error!(error = %e, "export failed");
            ApiReply::text(500, EXPORT_FAILED)
        }
    }
}

fn handle_clear(db: &Database) -> Result<ApiReply, ApiError> {
    let deleted = db.clear_all()?;
    tracing::warn!(rows = deleted, "all diagnoses cleared");
    Ok(ApiReply::json(
        200,
        &MessageResponse {
            message: CLEARED_MESSAGE.to_string(),
        },
    ))
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("cannot bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error(transparent)]
    Database(#[from] DbError),
}

/// Stops a running [`DiagnosisServer`] from another thread
#[derive(Clone)]
pub struct ShutdownHandle {
    server: Arc<Server>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.server.unblock();
    }
}

/// A bound listener plus the store it serves
pub struct DiagnosisServer {
    server: Arc<Server>,
    db: Database,
    max_body_bytes: usize,
}

impl DiagnosisServer {
    pub fn bind(addr: &str, db: Database, max_body_bytes: usize) -> Result<Self, ServeError> {
        let server = Server::http(addr).map_err(|e| ServeError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            server: Arc::new(server),
            db,
            max_body_bytes,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server: Arc::clone(&self.server),
        }
    }

    /// Serve requests until shut down
    pub fn run(&self) {
        for request in self.server.incoming_requests() {
            if let Err(e) = self.handle_request(request) {
                tracing::warn!(error = %e, "failed to send response");
            }
        }
        tracing::info!("server stopped");
    }

    fn handle_request(&self, mut request: Request) -> std::io::Result<()> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let method = request.method().clone();
        let url = request.url().to_string();

        let span = tracing::info_span!(
            "request",
            id = %request_id,
            method = %method,
            path = %split_url(&url).0
        );
        let _enter = span.enter();

        let reply = match read_body(&mut request, self.max_body_bytes) {
            Ok(body) => {
                let mut api_request = ApiRequest::new(method, &url).with_body(body);
                api_request.cors_request_headers =
                    header_value(&request, "Access-Control-Request-Headers");
                route(&self.db, &api_request)
            }
            Err(e) => ApiReply::error(&e).with_header("Access-Control-Allow-Origin", "*"),
        };

        let status = reply.status;
        let result = request.respond(reply.into_response());
        tracing::info!(
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        result
    }
}

fn header_value(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_string())
}

/// Read the whole body, refusing anything larger than `limit`
fn read_body(request: &mut Request, limit: usize) -> Result<Vec<u8>, ApiError> {
    if request.body_length().is_some_and(|len| len > limit) {
        return Err(ApiError::PayloadTooLarge { limit });
    }

    let mut body = Vec::new();
    request
        .as_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| ApiError::MalformedRequest(format!("failed to read body: {}", e)))?;

    if body.len() > limit {
        return Err(ApiError::PayloadTooLarge { limit });
    }
    Ok(body)
}

/// Open the configured database and serve until the process exits
pub fn start_server(config: &Config) -> Result<(), ServeError> {
    let db = Database::open_at(&config.database.path)?;
    let addr = config.bind_addr();
    let server = DiagnosisServer::bind(&addr, db, config.server.max_body_bytes)?;

    let url = format!("http://localhost:{}", config.server.port);
    eprintln!("\n{}", "🩺 Diagnosis Store".green().bold());
    eprintln!("   Server running at {}", url);
    eprintln!("   Database: {}", config.database.path.display());
    eprintln!("   Press Ctrl+C to stop\n");

    tracing::info!(%addr, db = %config.database.path.display(), "listening");
    server.run();
    Ok(())
}
