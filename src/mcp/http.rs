//! Streamable HTTP transport
//!
//! JSON-RPC messages are POSTed to a single endpoint. An `initialize` request
//! opens a session whose id travels in the `Mcp-Session-Id` header; every
//! later message must carry it. Requests are answered with an
//! `application/json` body, notifications with `202 Accepted`.
//!
//! Sessions that go quiet are expired, and the number kept at once is capped.

use crate::mcp::errors::McpError;
use crate::mcp::protocol::JsonRpcMessage;
use crate::mcp::server::{ConnectionState, McpServer, MessageHandler};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Path the MCP endpoint is mounted at
pub const MCP_ENDPOINT: &str = "/mcp";

/// Header carrying the session id
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Sessions not seen for this long are dropped
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Most sessions kept at once
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

struct Session {
    state: Arc<RwLock<ConnectionState>>,
    last_seen: DateTime<Utc>,
}

impl Session {
    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_seen).to_std().unwrap_or_default()
    }
}

type Sessions = Arc<RwLock<HashMap<String, Session>>>;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    server: Arc<McpServer>,
    sessions: Sessions,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl HttpState {
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        Self {
            server,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    /// Override the idle timeout and the session cap (at least one session is always kept)
    #[inline]
    #[must_use]
    pub fn with_session_limits(mut self, idle_timeout: Duration, max_sessions: usize) -> Self {
        self.idle_timeout = idle_timeout;
        self.max_sessions = max_sessions.max(1);
        self
    }

    #[inline]
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session.idle_for(now) >= self.idle_timeout
    }

    /// Drop expired sessions, then evict the least recently seen until one more fits
    fn make_room(&self, sessions: &mut HashMap<String, Session>, now: DateTime<Utc>) {
        sessions.retain(|id, session| {
            let expired = self.is_expired(session, now);
            if expired {
                info!("Expired idle MCP session {}", id);
            }
            !expired
        });

        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            info!("Evicted least recently used MCP session {}", oldest);
        }
    }
}

/// Bind `host:port` and serve until Ctrl-C or SIGTERM
#[inline]
pub async fn serve_http(server: Arc<McpServer>, host: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;

    serve_listener(listener, HttpState::new(server), shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves
#[inline]
pub async fn serve_listener<F>(listener: TcpListener, state: HttpState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    info!(
        "Starting MCP server with streamable HTTP transport on http://{}{}",
        local_addr, MCP_ENDPOINT
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    info!("MCP server stopped");
    Ok(())
}

/// Create the HTTP router
#[inline]
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route(
            MCP_ENDPOINT,
            get(handle_get).post(handle_post).delete(handle_delete),
        )
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Shutdown signal received");
}

async fn handle_post(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    if !accepts_json(&headers) {
        return plain_error(
            StatusCode::NOT_ACCEPTABLE,
            "Not Acceptable: Client must accept application/json",
        );
    }

    if !is_json_content(&headers) {
        return plain_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported Media Type: Content-Type must be application/json",
        );
    }

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return jsonrpc_error(StatusCode::BAD_REQUEST, &McpError::from(e));
        }
    };

    let is_initialize = value.get("method").and_then(Value::as_str) == Some("initialize")
        && value.get("id").is_some();

    if is_initialize {
        return open_session(&state, &value).await;
    }

    let (session_id, session) = match find_session(&state, &headers).await {
        Ok(found) => found,
        Err((status, error)) => return jsonrpc_error(status, &error),
    };

    let handler = MessageHandler::with_state(Arc::clone(&state.server), session);
    match handler.handle_value(&value).await {
        Some(reply) => with_session_header(json_reply(&reply), &session_id),
        None => with_session_header(StatusCode::ACCEPTED.into_response(), &session_id),
    }
}

async fn open_session(state: &HttpState, value: &Value) -> Response {
    let session = Arc::new(RwLock::new(ConnectionState::Uninitialized));
    let handler = MessageHandler::with_state(Arc::clone(&state.server), Arc::clone(&session));

    let Some(reply) = handler.handle_value(value).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    if matches!(reply, JsonRpcMessage::ErrorResponse(_)) {
        return json_reply(&reply);
    }

    let session_id = uuid::Uuid::new_v4().simple().to_string();
    {
        let now = Utc::now();
        let mut sessions = state.sessions.write().await;
        state.make_room(&mut sessions, now);
        sessions.insert(
            session_id.clone(),
            Session {
                state: session,
                last_seen: now,
            },
        );
    }
    info!("Opened MCP session {}", session_id);

    with_session_header(json_reply(&reply), &session_id)
}

async fn handle_delete(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let Some(id) = session_id(&headers) else {
        return jsonrpc_error(StatusCode::BAD_REQUEST, &McpError::SessionRequired);
    };

    let removed = state.sessions.write().await.remove(&id);
    match removed {
        Some(session) => {
            *session.state.write().await = ConnectionState::Closed;
            info!("Closed MCP session {}", id);
            StatusCode::OK.into_response()
        }
        None => jsonrpc_error(StatusCode::NOT_FOUND, &McpError::SessionNotFound { id }),
    }
}

/// No server-initiated stream is offered
async fn handle_get() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, HeaderValue::from_static("POST, DELETE"))],
    )
        .into_response()
}

/// Health check endpoint
async fn health_check(State(state): State<HttpState>) -> impl IntoResponse {
    let health = state.server.health_status().await;
    Json(serde_json::json!({
        "status": "ok",
        "service": state.server.server_info.name,
        "version": state.server.server_info.version,
        "tools_registered": health.tools_registered,
        "sessions": state.session_count().await,
        "uptime_secs": health.uptime.as_secs(),
    }))
}

async fn find_session(
    state: &HttpState,
    headers: &HeaderMap,
) -> std::result::Result<(String, Arc<RwLock<ConnectionState>>), (StatusCode, McpError)> {
    let id = session_id(headers).ok_or((StatusCode::BAD_REQUEST, McpError::SessionRequired))?;

    let now = Utc::now();
    let mut sessions = state.sessions.write().await;
    let Some(session) = sessions.get_mut(&id) else {
        return Err((StatusCode::NOT_FOUND, McpError::SessionNotFound { id }));
    };

    if state.is_expired(session, now) {
        sessions.remove(&id);
        info!("Expired idle MCP session {}", id);
        return Err((StatusCode::NOT_FOUND, McpError::SessionNotFound { id }));
    }

    debug!("Message for session {}", id);
    session.last_seen = now;
    Ok((id, Arc::clone(&session.state)))
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// An absent `Accept` header counts as accepting anything
fn accepts_json(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return true;
    };

    accept.split(',').any(|range| {
        let media = range.split(';').next().unwrap_or_default().trim();
        media.eq_ignore_ascii_case("application/json")
            || media == "application/*"
            || media == "*/*"
    })
}

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

fn json_reply(message: &JsonRpcMessage) -> Response {
    (StatusCode::OK, Json(message)).into_response()
}

fn jsonrpc_error(status: StatusCode, error: &McpError) -> Response {
    error.log();
    (status, Json(error.to_error_response(None))).into_response()
}

fn plain_error(status: StatusCode, message: &'static str) -> Response {
    (status, message).into_response()
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}
