//! Admin bearer-token middleware

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::app::AppState;

/// Extract the token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Check a raw Authorization header against the configured admin token
pub fn verify_admin(auth_header: Option<&str>, expected: Option<&str>) -> Result<(), AuthError> {
    let expected = expected.ok_or(AuthError::Disabled)?;
    let header = auth_header.ok_or(AuthError::MissingHeader)?;
    let token = extract_bearer_token(header).ok_or(AuthError::InvalidFormat)?;

    if token.len() != expected.len() || !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(AuthError::InvalidToken);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Admin endpoints are disabled")]
    Disabled,

    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::Disabled => StatusCode::NOT_FOUND,
            AuthError::MissingHeader => StatusCode::UNAUTHORIZED,
            AuthError::InvalidFormat => StatusCode::BAD_REQUEST,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Middleware to require the admin token
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    if let Err(e) = verify_admin(header, state.config.admin_token.as_deref()) {
        warn!(error = %e, path = %request.uri().path(), "Admin request rejected");
        return Err(e);
    }

    Ok(next.run(request).await)
}
