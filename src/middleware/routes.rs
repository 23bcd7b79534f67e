use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::HOST;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;
use url::Url;

use super::config::AuthSettings;
use super::cookies;
use super::error::{AuthError, found};
use super::extractor::CurrentSession;
use super::guard::require_auth;
use super::state::AuthState;
use crate::pkce::LoginChallenge;
use crate::provider::IdentityProvider;
use crate::session::SessionManager;
use crate::store::{SessionStore, UserStore};
use crate::types::{SessionId, UserProfile};

/// Create the authentication router: login, callback, logout and the
/// guarded current-user endpoint, all under the configured auth path.
pub fn auth_routes<P, U, S>(state: AuthState<P, U, S>) -> Router
where
    P: IdentityProvider,
    U: UserStore,
    S: SessionStore,
{
    let auth_path = state.settings.auth_path.clone();

    let guarded = Router::new()
        .route(&format!("{auth_path}/auth/user"), get(current_user::<P, U, S>))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_auth::<P, U, S>,
        ));

    Router::new()
        .route(&format!("{auth_path}/login"), get(login::<P, U, S>))
        .route(&format!("{auth_path}/callback"), get(callback::<P, U, S>))
        .route(
            &format!("{auth_path}/logout"),
            get(logout::<P, U, S>).post(logout::<P, U, S>),
        )
        .merge(guarded)
        .with_state(state)
}

// ── Login ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginParams {
    #[serde(rename = "returnTo")]
    return_to: Option<String>,
}

async fn login<P: IdentityProvider, U: UserStore, S: SessionStore>(
    State(state): State<AuthState<P, U, S>>,
    jar: PrivateCookieJar,
    Query(params): Query<LoginParams>,
    headers: HeaderMap,
) -> Result<(PrivateCookieJar, Response), AuthError> {
    let redirect_uri = callback_url(&headers, &state.settings)?;
    let challenge = LoginChallenge::generate();

    let authorize = state
        .provider
        .authorization_url(&redirect_uri, &challenge.state, &challenge.code_challenge)
        .await?;

    let return_to = params.return_to.filter(|p| cookies::is_local_path(p));
    let jar = cookies::add_login_cookies(jar, &challenge, return_to, &state.settings);

    Ok((jar, found(authorize.as_str())))
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback<P: IdentityProvider, U: UserStore, S: SessionStore>(
    State(state): State<AuthState<P, U, S>>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<(PrivateCookieJar, Response), AuthError> {
    let settings = &state.settings;
    let redirect_uri = callback_url(&headers, settings)?;

    if let Some(error) = &params.error {
        let desc = params.error_description.as_deref().unwrap_or("Unknown error");
        tracing::warn!(error = %error, description = %desc, "OAuth2 error from identity provider");
        return Err(login_again(settings, "provider_error"));
    }

    let code = params
        .code
        .ok_or_else(|| login_again(settings, "missing_code"))?;

    let received_state = params
        .state
        .ok_or_else(|| login_again(settings, "state_mismatch"))?;
    let stored_state =
        cookies::login_state(&jar).ok_or_else(|| login_again(settings, "state_mismatch"))?;
    if received_state != stored_state {
        return Err(login_again(settings, "state_mismatch"));
    }

    let code_verifier =
        cookies::pkce_verifier(&jar).ok_or_else(|| login_again(settings, "missing_verifier"))?;

    let grant = state
        .provider
        .exchange_code(&code, &code_verifier, &redirect_uri)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Token exchange failed");
            login_again(settings, "token_exchange_failed")
        })?;

    let record = SessionManager::<P, U>::establish_session(grant.claims, grant.tokens);
    state.manager.complete_login(record.claims()).await?;

    if let Some(previous) = cookies::session_id(&jar, settings) {
        if let Err(e) = state.sessions.destroy(&previous).await {
            tracing::warn!(error = %e, session_id = %previous, "Previous session deletion failed");
        }
    }

    let session_id = SessionId::generate();
    state
        .sessions
        .save(&session_id, &record, settings.session_ttl)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

    let target = cookies::return_to(&jar).unwrap_or_else(|| settings.login_redirect.clone());
    let jar = cookies::clear_login_cookies(jar, settings)
        .add(cookies::session_cookie(&session_id, settings));

    tracing::info!(
        session_id = %session_id,
        subject = %record.claims().sub,
        "OIDC login successful"
    );

    Ok((jar, found(&target)))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<P: IdentityProvider, U: UserStore, S: SessionStore>(
    State(state): State<AuthState<P, U, S>>,
    jar: PrivateCookieJar,
    headers: HeaderMap,
) -> (PrivateCookieJar, Response) {
    let settings = &state.settings;

    if let Some(session_id) = cookies::session_id(&jar, settings) {
        if let Err(e) = state.sessions.destroy(&session_id).await {
            tracing::warn!(error = %e, session_id = %session_id, "Session deletion failed during logout");
        }
    }
    let jar = cookies::clear_session_cookie(jar, settings);

    let target = match origin(&headers, settings) {
        Ok(post_logout) => match state
            .provider
            .end_session_url(&post_logout.origin().ascii_serialization())
            .await
        {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(error = %e, "End-session URL unavailable");
                "/".to_string()
            }
        },
        Err(_) => "/".to_string(),
    };

    (jar, found(&target))
}

// ── Current user ───────────────────────────────────────────────────

async fn current_user<P: IdentityProvider, U: UserStore, S: SessionStore>(
    State(state): State<AuthState<P, U, S>>,
    session: CurrentSession,
) -> Result<Json<UserProfile>, AuthError> {
    let subject = &session.record.claims().sub;
    state
        .manager
        .users()
        .find(subject)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?
        .map(Json)
        .ok_or(AuthError::Unauthenticated)
}

// ── Helpers ────────────────────────────────────────────────────────

fn login_again(settings: &AuthSettings, reason: &'static str) -> AuthError {
    AuthError::Authentication {
        reason,
        login_path: format!("{}/login", settings.auth_path),
    }
}

/// `{scheme}://{host}` for an allowed host.
fn origin(headers: &HeaderMap, settings: &AuthSettings) -> Result<Url, AuthError> {
    let host = request_host(headers).ok_or_else(|| AuthError::UnknownDomain(String::new()))?;
    if !settings.allows(&host) {
        return Err(AuthError::UnknownDomain(host));
    }
    let scheme = request_scheme(headers, settings);
    Url::parse(&format!("{scheme}://{host}")).map_err(|_| AuthError::UnknownDomain(host))
}

fn callback_url(headers: &HeaderMap, settings: &AuthSettings) -> Result<Url, AuthError> {
    let mut url = origin(headers, settings)?;
    url.set_path(&format!("{}/callback", settings.auth_path));
    Ok(url)
}

fn first_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Hostname without port, preferring `X-Forwarded-Host`.
fn request_host(headers: &HeaderMap) -> Option<String> {
    first_header_value(headers, "x-forwarded-host")
        .or_else(|| first_header_value(headers, HOST.as_str()))
        .and_then(|host| host.split(':').next().map(str::to_ascii_lowercase))
        .filter(|host| !host.is_empty())
}

fn request_scheme(headers: &HeaderMap, settings: &AuthSettings) -> String {
    first_header_value(headers, "x-forwarded-proto").unwrap_or_else(|| {
        if settings.secure_cookies { "https" } else { "http" }.to_string()
    })
}
