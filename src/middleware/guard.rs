use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::PrivateCookieJar;
use time::OffsetDateTime;

use super::cookies;
use super::error::AuthError;
use super::extractor::CurrentSession;
use super::state::AuthState;
use crate::provider::IdentityProvider;
use crate::store::{SessionStore, UserStore};

/// Access guard as an axum middleware.
///
/// Admits the request when its session is valid, or expired but refreshable
/// and the refresh succeeds; otherwise answers `401`.
///
/// ```rust,ignore
/// let protected = Router::new()
///     .route("/api/things", get(list_things))
///     .route_layer(axum::middleware::from_fn_with_state(
///         auth_state.clone(),
///         require_auth::<ProviderCache, PgUserStore, PgSessionStore>,
///     ));
/// ```
pub async fn require_auth<P, U, S>(
    State(state): State<AuthState<P, U, S>>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response
where
    P: IdentityProvider,
    U: UserStore,
    S: SessionStore,
{
    let Some(session_id) = cookies::session_id(&jar, &state.settings) else {
        return AuthError::Unauthenticated.into_response();
    };

    let now = OffsetDateTime::now_utc().unix_timestamp();
    match state.guard.authorize(Some(&session_id), now).await {
        Ok(record) => {
            request
                .extensions_mut()
                .insert(CurrentSession { session_id, record });
            next.run(request).await
        }
        Err(rejection) => {
            tracing::debug!(?rejection, session_id = %session_id, "request rejected");
            AuthError::Unauthenticated.into_response()
        }
    }
}
