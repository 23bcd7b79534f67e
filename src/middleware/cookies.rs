use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use super::config::AuthSettings;
use crate::pkce::LoginChallenge;
use crate::types::SessionId;

const PKCE_COOKIE_NAME: &str = "__portal_pkce";
const STATE_COOKIE_NAME: &str = "__portal_state";
const RETURN_TO_COOKIE_NAME: &str = "__portal_return_to";

const LOGIN_COOKIE_TTL: Duration = Duration::minutes(5);

fn login_cookie(name: &'static str, value: String, settings: &AuthSettings) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(settings.secure_cookies)
        .same_site(SameSite::Lax)
        .path(settings.auth_path.clone())
        .max_age(LOGIN_COOKIE_TTL)
        .build()
}

fn removal(name: &'static str, path: String) -> Cookie<'static> {
    Cookie::build((name, "")).path(path).build()
}

/// Remember the verifier, state and optional return path until the callback.
pub(super) fn add_login_cookies(
    jar: PrivateCookieJar,
    challenge: &LoginChallenge,
    return_to: Option<String>,
    settings: &AuthSettings,
) -> PrivateCookieJar {
    let jar = jar
        .add(login_cookie(PKCE_COOKIE_NAME, challenge.code_verifier.clone(), settings))
        .add(login_cookie(STATE_COOKIE_NAME, challenge.state.clone(), settings));

    match return_to {
        Some(path) => jar.add(login_cookie(RETURN_TO_COOKIE_NAME, path, settings)),
        None => jar.remove(removal(RETURN_TO_COOKIE_NAME, settings.auth_path.clone())),
    }
}

pub(super) fn clear_login_cookies(jar: PrivateCookieJar, settings: &AuthSettings) -> PrivateCookieJar {
    [PKCE_COOKIE_NAME, STATE_COOKIE_NAME, RETURN_TO_COOKIE_NAME]
        .into_iter()
        .fold(jar, |jar, name| {
            jar.remove(removal(name, settings.auth_path.clone()))
        })
}

pub(super) fn pkce_verifier(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(PKCE_COOKIE_NAME).map(|c| c.value().to_string())
}

pub(super) fn login_state(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(STATE_COOKIE_NAME).map(|c| c.value().to_string())
}

pub(super) fn return_to(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(RETURN_TO_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|path| is_local_path(path))
}

/// Same-origin absolute paths only: `/x` but not `//host/x` or `/\host`.
pub(super) fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// Encrypted session cookie that lives as long as the stored session.
pub(super) fn session_cookie(session_id: &SessionId, settings: &AuthSettings) -> Cookie<'static> {
    let max_age = Duration::try_from(settings.session_ttl).unwrap_or(Duration::days(7));
    Cookie::build((settings.session_cookie_name.clone(), session_id.to_string()))
        .http_only(true)
        .secure(settings.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

pub(super) fn session_id(jar: &PrivateCookieJar, settings: &AuthSettings) -> Option<SessionId> {
    jar.get(&settings.session_cookie_name)
        .map(|c| SessionId::from(c.value().to_string()))
}

pub(super) fn clear_session_cookie(jar: PrivateCookieJar, settings: &AuthSettings) -> PrivateCookieJar {
    jar.remove(Cookie::build((settings.session_cookie_name.clone(), "")).path("/"))
}
