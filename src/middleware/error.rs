use axum::Json;
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};

use crate::session::UpsertFailure;

/// Authentication errors for the middleware layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No valid session, or a session that could not be refreshed.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The login round trip failed (provider error, state mismatch, failed
    /// exchange). The user agent is sent back to log in again.
    #[error("Authentication failed: {reason}")]
    Authentication {
        reason: &'static str,
        login_path: String,
    },

    /// Login was attempted on a host with no registered redirect.
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    /// The identity provider could not be reached or discovered.
    #[error("Identity provider error: {0}")]
    Provider(#[from] crate::error::Error),

    #[error("User upsert failed: {0}")]
    Upsert(#[from] UpsertFailure),

    /// Session store operation failed.
    #[error("Session store error: {0}")]
    Store(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// `302 Found` to `target`.
pub(super) fn found(target: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, target.to_string())]).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "message": "Unauthorized" })),
            )
                .into_response(),
            Self::Authentication { reason, login_path } => {
                tracing::warn!(reason, "login failed, restarting");
                found(&login_path)
            }
            Self::UnknownDomain(ref host) => {
                tracing::warn!(host = %host, "login on unregistered domain");
                (StatusCode::BAD_REQUEST, "Unknown domain").into_response()
            }
            Self::Provider(ref e) => {
                tracing::error!(error = %e, "identity provider unavailable");
                (StatusCode::BAD_GATEWAY, "Identity provider unavailable").into_response()
            }
            Self::Upsert(_) | Self::Store(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
