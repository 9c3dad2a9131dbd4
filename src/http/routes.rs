//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::http::middleware::require_admin;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::RoundStatus;

/// Upper bound on plain HTTP requests; the socket route is exempt
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/round", get(round_handler))
        .layer(TimeoutLayer::new(HTTP_REQUEST_TIMEOUT));

    let admin_routes = Router::new()
        .route("/admin/reset", post(reset_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/ws", get(ws_handler))
        .merge(public_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    active_players: usize,
    round_number: u64,
    snapshots_sent: u64,
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let status = state.arena.status().await.ok_or(AppError::ArenaUnavailable)?;

    Ok(Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        connections: state.connections.len(),
        active_players: status.active_players,
        round_number: status.round.number,
        snapshots_sent: status.snapshots_sent,
    }))
}

// ============================================================================
// Round endpoint
// ============================================================================

async fn round_handler(State(state): State<AppState>) -> Result<Json<RoundStatus>, AppError> {
    let status = state.arena.status().await.ok_or(AppError::ArenaUnavailable)?;
    Ok(Json(status.round))
}

// ============================================================================
// Admin endpoints
// ============================================================================

#[derive(Serialize)]
struct ResetResponse {
    success: bool,
}

async fn reset_handler(State(state): State<AppState>) -> Result<Json<ResetResponse>, AppError> {
    if !state.arena.reset().await {
        return Err(AppError::ArenaUnavailable);
    }
    info!("Arena reset requested over HTTP");
    Ok(Json(ResetResponse { success: true }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Arena is not running")]
    ArenaUnavailable,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::ArenaUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
