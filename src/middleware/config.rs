use std::time::Duration;

use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};
use url::Url;

use super::error::AuthError;
use crate::oidc::OidcConfig;

const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl: Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
    pub(crate) login_redirect: String,
    pub(crate) allowed_domains: Vec<String>,
}

impl AuthSettings {
    fn new(cookie_key: Key, allowed_domains: Vec<String>) -> Self {
        Self {
            cookie_key,
            session_cookie_name: "__portal_session".into(),
            session_ttl: SESSION_TTL,
            secure_cookies: true,
            auth_path: "/api".into(),
            login_redirect: "/".into(),
            allowed_domains,
        }
    }

    pub(crate) fn allows(&self, host: &str) -> bool {
        self.allowed_domains
            .iter()
            .any(|domain| domain.eq_ignore_ascii_case(host))
    }
}

/// Authentication configuration: the provider registration plus cookie and
/// session settings.
///
/// Use [`from_env()`](AuthConfig::from_env) for convention-based setup, or
/// [`new()`](AuthConfig::new) with `with_*` methods for full control.
pub struct AuthConfig {
    pub(super) oidc: OidcConfig,
    pub(super) settings: AuthSettings,
}

impl AuthConfig {
    /// Create config from the provider registration, the session secret and
    /// the domains the app is served on.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the secret is empty or no domain is given.
    pub fn new(
        oidc: OidcConfig,
        session_secret: &str,
        allowed_domains: Vec<String>,
    ) -> Result<Self, AuthError> {
        if allowed_domains.is_empty() {
            return Err(AuthError::Config("at least one allowed domain is required".into()));
        }
        Ok(Self {
            oidc,
            settings: AuthSettings::new(derive_cookie_key(session_secret)?, allowed_domains),
        })
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `ISSUER_URL`: OIDC issuer (discovery base URL)
    /// - `CLIENT_ID`, `CLIENT_SECRET`: provider registration
    /// - `SESSION_SECRET`: cookie encryption secret
    /// - `ALLOWED_DOMAINS`: comma-separated hostnames, one provider redirect per domain
    ///
    /// # Optional env vars
    /// - `SECURE_COOKIES`: `"0"` or `"false"` drops the `Secure` flag (plain-HTTP development)
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] naming the first missing or invalid value.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let required = |key: &str| {
            var(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::Config(format!("{key} is required")))
        };

        let issuer: Url = required("ISSUER_URL")?
            .parse()
            .map_err(|e| AuthError::Config(format!("ISSUER_URL: {e}")))?;
        let client_id = required("CLIENT_ID")?;
        let client_secret = required("CLIENT_SECRET")?;
        let session_secret = required("SESSION_SECRET")?;
        let allowed_domains: Vec<String> = required("ALLOWED_DOMAINS")?
            .split(',')
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        let secure = !matches!(var("SECURE_COOKIES").as_deref(), Some("0") | Some("false"));

        Ok(Self::new(
            OidcConfig::new(issuer, client_id, client_secret),
            &session_secret,
            allowed_domains,
        )?
        .with_secure_cookies(secure))
    }

    /// The provider registration, for building the [`ProviderCache`](crate::ProviderCache).
    #[must_use]
    pub fn oidc(&self) -> &OidcConfig {
        &self.oidc
    }

    /// Use an explicit cookie key instead of the one derived from the secret.
    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    /// Lifetime of stored sessions and of the session cookie (default: 7 days).
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.settings.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Prefix for the login, callback and logout routes (default: `/api`).
    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    /// Where a completed login lands when no return path was requested (default: `/`).
    #[must_use]
    pub fn with_login_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.login_redirect = path.into();
        self
    }
}

/// 64-byte cookie key from an arbitrary-length secret.
fn derive_cookie_key(secret: &str) -> Result<Key, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::Config("SESSION_SECRET must not be empty".into()));
    }
    let digest = Sha512::digest(secret.as_bytes());
    Key::try_from(digest.as_slice())
        .map_err(|_| AuthError::Config("SESSION_SECRET could not derive a cookie key".into()))
}
