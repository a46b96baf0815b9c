//! HTTP gateway: the consumer-facing surface.
//!
//! Routes (all under `/api`):
//! - `GET /events`: push stream of hub events (server-sent events)
//! - `POST /login`, `GET /users`, `GET /channels`, `POST /channel`,
//!   `POST /publish`, `POST /message`, `GET /history`,
//!   `GET /private-history`: backend RPC, reply returned verbatim
//! - `GET /servers`: roster from the reference service
//! - `GET /clock`: this process's logical clock
//! - `GET /health`: liveness

mod handlers;
mod stream;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::clock::LogicalClock;
use crate::hub::BroadcastHub;
use crate::rpc::{BackendClient, RpcError};

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub backend: BackendClient,
    pub clock: Arc<LogicalClock>,
    pub hub: Arc<BroadcastHub>,
    /// Reconnect hint sent at the start of every push stream.
    pub retry: Duration,
}

/// Errors returned to HTTP callers as `{"error": ..}`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingField(_) => StatusCode::BAD_REQUEST,
            GatewayError::Rpc(RpcError::ClockInjected) => StatusCode::BAD_REQUEST,
            GatewayError::Rpc(RpcError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Rpc(RpcError::Unavailable { .. })
            | GatewayError::Rpc(RpcError::MalformedReply { .. }) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, status = status.as_u16(), "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the axum router (separated for testing).
pub fn router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/events", get(stream::events))
        .route("/api/login", post(handlers::login))
        .route("/api/users", get(handlers::users))
        .route("/api/channels", get(handlers::channels))
        .route("/api/channel", post(handlers::create_channel))
        .route("/api/publish", post(handlers::publish))
        .route("/api/message", post(handlers::message))
        .route("/api/history", get(handlers::history))
        .route("/api/private-history", get(handlers::private_history))
        .route("/api/servers", get(handlers::servers))
        .route("/api/clock", get(handlers::clock))
        .route("/api/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the gateway on an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Gateway HTTP listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
