use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::AuthError;
use crate::session::SessionRecord;
use crate::types::SessionId;

/// The session admitted by [`require_auth`](super::require_auth).
///
/// The layer inserts it into request extensions; handlers behind the layer
/// take it as an extractor. Outside the layer it rejects with `401`.
///
/// # Example
///
/// ```rust,ignore
/// async fn whoami(session: CurrentSession) -> String {
///     session.record.claims().sub.to_string()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session_id: SessionId,
    /// The record as it stood after the guard, refreshed if it had to be.
    pub record: SessionRecord,
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}
