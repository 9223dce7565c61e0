//! Local HTTP control API for a running agent.
//!
//! Lets another process on the same machine (a dashboard, a phone bridge)
//! drive the tracking session and read its status.
//!
//! # Architecture
//!
//! ```text
//! client ──→ POST /tracking/start ──→ ControlCommand ──→ agent loop
//!        ←── GET /status          ←── SharedStatus   ←──┘
//! ```

use crate::agent::{read_status, ControlCommand, SharedStatus};
use crate::session::{SessionStatus, Visibility};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    commands: Sender<ControlCommand>,
    status: SharedStatus,
}

impl ServerState {
    pub fn new(commands: Sender<ControlCommand>, status: SharedStatus) -> Self {
        Self { commands, status }
    }

    fn send(&self, command: ControlCommand) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
        self.commands.send(command).map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "agent is not running".to_string(),
                    code: "AGENT_STOPPED".to_string(),
                }),
            )
        })
    }
}

/// Health check response
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Acknowledgement for a queued command
#[derive(Serialize, Deserialize)]
pub struct CommandResponse {
    pub accepted: bool,
    pub command: String,
}

impl CommandResponse {
    fn accepted(command: &str) -> Json<Self> {
        Json(Self {
            accepted: true,
            command: command.to_string(),
        })
    }
}

/// Body of POST /visibility
#[derive(Serialize, Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

type ApiResult = Result<Json<CommandResponse>, (StatusCode, Json<ErrorResponse>)>;

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
async fn status(State(state): State<Arc<ServerState>>) -> Json<SessionStatus> {
    Json(read_status(&state.status))
}

/// POST /tracking/start
async fn start_tracking(State(state): State<Arc<ServerState>>) -> ApiResult {
    state.send(ControlCommand::Start)?;
    Ok(CommandResponse::accepted("start"))
}

/// POST /tracking/stop
async fn stop_tracking(State(state): State<Arc<ServerState>>) -> ApiResult {
    state.send(ControlCommand::Stop)?;
    Ok(CommandResponse::accepted("stop"))
}

/// POST /alert/dismiss
async fn dismiss_alert(State(state): State<Arc<ServerState>>) -> ApiResult {
    state.send(ControlCommand::Dismiss)?;
    Ok(CommandResponse::accepted("dismiss"))
}

/// POST /visibility
async fn set_visibility(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<VisibilityRequest>,
) -> ApiResult {
    let visibility = if body.visible {
        Visibility::Visible
    } else {
        Visibility::Hidden
    };
    state.send(ControlCommand::Visibility(visibility))?;
    Ok(CommandResponse::accepted(if body.visible {
        "visible"
    } else {
        "hidden"
    }))
}

/// Build the router without binding it.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/tracking/start", post(start_tracking))
        .route("/tracking/stop", post(stop_tracking))
        .route("/alert/dismiss", post(dismiss_alert))
        .route("/visibility", post(set_visibility))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    commands: Sender<ControlCommand>,
    status: SharedStatus,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(Arc::new(ServerState::new(commands, status)));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Control API listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
