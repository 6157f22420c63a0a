//! Bearer token authentication with loopback bypass
//!
//! Callers connecting from loopback (the hooks and crons on the same box)
//! are trusted without credentials. Everyone else must present the
//! configured bearer token; with no token configured, remote callers are
//! rejected outright.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Auth configuration shared with the middleware
#[derive(Debug, Clone)]
pub struct AuthState {
    pub token: Option<String>,
}

/// Authentication middleware
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if addr.ip().is_loopback() {
        return Ok(next.run(request).await);
    }

    let Some(expected_token) = &auth.token else {
        return Err(AuthError::RemoteAccessDisabled);
    };

    // Get Authorization header
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    // Check Bearer token format
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?;

    if token != expected_token {
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

/// Authentication errors
#[derive(Debug)]
pub enum AuthError {
    RemoteAccessDisabled,
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::RemoteAccessDisabled => (
                StatusCode::FORBIDDEN,
                "Remote access requires a configured auth token",
            ),
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing Authorization header"),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization format (expected: Bearer <token>)",
            ),
            AuthError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid token"),
        };

        (status, message).into_response()
    }
}
