//! End-to-end checks of the HTTP surface against a scripted provider and
//! in-memory stores.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::{COOKIE, HOST, LOCATION, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use oidc_portal::middleware::{AuthConfig, AuthState, auth_routes};
use oidc_portal::store::{MemorySessionStore, MemoryUserStore, StoreError};
use oidc_portal::{
    Error, IdentityClaims, IdentityProvider, OidcConfig, ProviderGrant, SubjectId, TokenPair,
    UserProfile, UserStore,
};
use tower::ServiceExt;
use url::Url;

const HOST_NAME: &str = "app.test";

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

fn claims(exp: i64) -> IdentityClaims {
    IdentityClaims {
        sub: SubjectId::from("user-1".to_string()),
        email: Some("user-1@example.com".into()),
        first_name: Some("Ada".into()),
        last_name: Some("Lovelace".into()),
        profile_image_url: None,
        exp: Some(exp),
    }
}

/// Provider double: logins expire at `login_exp`, refreshes last an hour.
#[derive(Clone)]
struct ScriptedProvider {
    login_exp: i64,
    issues_refresh_token: bool,
    refresh_calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new(login_exp: i64, issues_refresh_token: bool) -> Self {
        Self {
            login_exp,
            issues_refresh_token,
            refresh_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl IdentityProvider for ScriptedProvider {
    async fn authorization_url(
        &self,
        redirect_uri: &Url,
        state: &str,
        code_challenge: &str,
    ) -> Result<Url, Error> {
        let mut url = Url::parse("https://idp.test/auth").unwrap();
        url.query_pairs_mut()
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge);
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: &str,
        _redirect_uri: &Url,
    ) -> Result<ProviderGrant, Error> {
        if code != "good-code" {
            return Err(Error::OAuth {
                operation: "token exchange",
                status: 400,
                detail: "invalid_grant".into(),
            });
        }
        Ok(ProviderGrant {
            claims: claims(self.login_exp),
            tokens: TokenPair {
                access_token: "at-login".into(),
                refresh_token: self.issues_refresh_token.then(|| "rt-login".into()),
            },
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<ProviderGrant, Error> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderGrant {
            claims: claims(now() + 3600),
            tokens: TokenPair {
                access_token: "at-refreshed".into(),
                refresh_token: Some("rt-refreshed".into()),
            },
        })
    }

    async fn end_session_url(&self, post_logout_redirect_uri: &str) -> Result<Url, Error> {
        let mut url = Url::parse("https://idp.test/logout").unwrap();
        url.query_pairs_mut()
            .append_pair("client_id", "portal")
            .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        Ok(url)
    }
}

struct BrokenUserStore;

impl UserStore for BrokenUserStore {
    async fn upsert(&self, _profile: UserProfile) -> Result<UserProfile, StoreError> {
        Err("users table unavailable".into())
    }

    async fn find(&self, _id: &SubjectId) -> Result<Option<UserProfile>, StoreError> {
        Ok(None)
    }
}

fn config() -> AuthConfig {
    let oidc = OidcConfig::new("https://idp.test".parse().unwrap(), "portal", "secret");
    AuthConfig::new(oidc, "integration-test-secret", vec![HOST_NAME.into()]).unwrap()
}

type TestState = AuthState<ScriptedProvider, MemoryUserStore, MemorySessionStore>;

fn app(provider: ScriptedProvider) -> (Router, TestState) {
    let state = AuthState::new(
        config(),
        provider,
        MemoryUserStore::new(),
        MemorySessionStore::new(),
    );
    (auth_routes(state.clone()), state)
}

/// Cookies the test client holds, updated from `Set-Cookie` like a browser.
#[derive(Default)]
struct Browser {
    cookies: BTreeMap<String, String>,
}

impl Browser {
    fn absorb(&mut self, response: &Response<Body>) {
        for header in response.headers().get_all(SET_COOKIE) {
            let pair = header.to_str().unwrap().split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            if value.is_empty() {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }

    fn request(&self, uri: &str) -> Request<Body> {
        let mut builder = Request::get(uri).header(HOST, HOST_NAME);
        if !self.cookies.is_empty() {
            let header = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(COOKIE, header);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn get(&mut self, app: &Router, uri: &str) -> Response<Body> {
        let response = app.clone().oneshot(self.request(uri)).await.unwrap();
        self.absorb(&response);
        response
    }
}

fn location(response: &Response<Body>) -> String {
    response.headers()[LOCATION].to_str().unwrap().to_string()
}

async fn json(response: Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Run login and callback; returns the callback response.
async fn log_in(browser: &mut Browser, app: &Router, login_uri: &str) -> Response<Body> {
    let login = browser.get(app, login_uri).await;
    assert_eq!(login.status(), StatusCode::FOUND);

    let authorize = Url::parse(&location(&login)).unwrap();
    let state = authorize
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    browser
        .get(app, &format!("/api/callback?code=good-code&state={state}"))
        .await
}

#[tokio::test]
async fn guarded_route_without_cookie_is_401_json() {
    let (app, _) = app(ScriptedProvider::new(now() + 3600, true));

    let response = Browser::default().get(&app, "/api/auth/user").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await, serde_json::json!({ "message": "Unauthorized" }));
}

#[tokio::test]
async fn login_redirects_to_provider_with_callback_for_host() {
    let (app, _) = app(ScriptedProvider::new(now() + 3600, true));
    let mut browser = Browser::default();

    let response = browser.get(&app, "/api/login").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let authorize = Url::parse(&location(&response)).unwrap();
    assert_eq!(authorize.host_str(), Some("idp.test"));
    let redirect_uri = authorize
        .query_pairs()
        .find(|(k, _)| k == "redirect_uri")
        .map(|(_, v)| v.into_owned());
    assert_eq!(redirect_uri.as_deref(), Some("https://app.test/api/callback"));
    assert!(browser.cookies.contains_key("__portal_pkce"));
    assert!(browser.cookies.contains_key("__portal_state"));
}

#[tokio::test]
async fn login_on_unknown_host_is_400() {
    let (app, _) = app(ScriptedProvider::new(now() + 3600, true));

    let request = Request::get("/api/login")
        .header(HOST, "evil.test")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_login_then_current_user() {
    let (app, state) = app(ScriptedProvider::new(now() + 3600, true));
    let mut browser = Browser::default();

    let callback = log_in(&mut browser, &app, "/api/login?returnTo=/dashboard").await;
    assert_eq!(callback.status(), StatusCode::FOUND);
    assert_eq!(location(&callback), "/dashboard");
    assert!(browser.cookies.contains_key("__portal_session"));
    assert!(!browser.cookies.contains_key("__portal_state"));
    assert_eq!(state.sessions().len(), 1);

    let response = browser.get(&app, "/api/auth/user").await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = json(response).await;
    assert_eq!(profile["id"], "user-1");
    assert_eq!(profile["email"], "user-1@example.com");
    assert_eq!(profile["firstName"], "Ada");
}

#[tokio::test]
async fn foreign_return_path_is_ignored() {
    let (app, _) = app(ScriptedProvider::new(now() + 3600, true));
    let mut browser = Browser::default();

    let callback = log_in(&mut browser, &app, "/api/login?returnTo=//evil.test/").await;

    assert_eq!(location(&callback), "/");
}

#[tokio::test]
async fn second_login_replaces_previous_session() {
    let (app, state) = app(ScriptedProvider::new(now() + 3600, true));
    let mut browser = Browser::default();

    log_in(&mut browser, &app, "/api/login").await;
    let first = browser.cookies["__portal_session"].clone();
    log_in(&mut browser, &app, "/api/login").await;

    assert_ne!(browser.cookies["__portal_session"], first);
    assert_eq!(state.sessions().len(), 1);
}

#[tokio::test]
async fn state_mismatch_restarts_login() {
    let (app, state) = app(ScriptedProvider::new(now() + 3600, true));
    let mut browser = Browser::default();

    browser.get(&app, "/api/login").await;
    let response = browser
        .get(&app, "/api/callback?code=good-code&state=forged")
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/api/login");
    assert!(state.sessions().is_empty());
}

#[tokio::test]
async fn provider_error_and_failed_exchange_restart_login() {
    let (app, _) = app(ScriptedProvider::new(now() + 3600, true));
    let mut browser = Browser::default();

    let denied = browser
        .get(&app, "/api/callback?error=access_denied&error_description=nope")
        .await;
    assert_eq!(denied.status(), StatusCode::FOUND);
    assert_eq!(location(&denied), "/api/login");

    let login = browser.get(&app, "/api/login").await;
    let state = Url::parse(&location(&login))
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    let rejected = browser
        .get(&app, &format!("/api/callback?code=bad-code&state={state}"))
        .await;
    assert_eq!(rejected.status(), StatusCode::FOUND);
    assert_eq!(location(&rejected), "/api/login");
}

#[tokio::test]
async fn upsert_failure_is_500_and_creates_no_session() {
    let state = AuthState::new(
        config(),
        ScriptedProvider::new(now() + 3600, true),
        BrokenUserStore,
        MemorySessionStore::new(),
    );
    let app = auth_routes(state.clone());
    let mut browser = Browser::default();

    let callback = log_in(&mut browser, &app, "/api/login").await;

    assert_eq!(callback.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.sessions().is_empty());
    assert!(!browser.cookies.contains_key("__portal_session"));
}

#[tokio::test]
async fn expired_session_with_refresh_token_is_refreshed() {
    let provider = ScriptedProvider::new(now() - 60, true);
    let refresh_calls = provider.refresh_calls.clone();
    let (app, _) = app(provider);
    let mut browser = Browser::default();

    log_in(&mut browser, &app, "/api/login").await;

    let first = browser.get(&app, "/api/auth/user").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);

    // The refreshed record was saved, so the next request is plainly valid.
    let second = browser.get(&app, "/api/auth/user").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_session_without_refresh_token_is_401() {
    let provider = ScriptedProvider::new(now() - 60, false);
    let refresh_calls = provider.refresh_calls.clone();
    let (app, _) = app(provider);
    let mut browser = Browser::default();

    log_in(&mut browser, &app, "/api/login").await;
    let response = browser.get(&app, "/api/auth/user").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn logout_destroys_session_and_redirects_to_end_session() {
    let (app, state) = app(ScriptedProvider::new(now() + 3600, true));
    let mut browser = Browser::default();

    log_in(&mut browser, &app, "/api/login").await;
    let held = Browser {
        cookies: browser.cookies.clone(),
    };

    let response = browser.get(&app, "/api/logout").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let end_session = Url::parse(&location(&response)).unwrap();
    assert_eq!(end_session.path(), "/logout");
    let params: BTreeMap<String, String> = end_session.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "portal");
    assert_eq!(params["post_logout_redirect_uri"], "https://app.test");

    assert!(state.sessions().is_empty());
    assert!(!browser.cookies.contains_key("__portal_session"));

    // A copy of the old cookie no longer opens anything.
    let replay = held.request("/api/auth/user");
    let response = app.oneshot(replay).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
