use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use url::Url;

use crate::claims::{ProviderGrant, TokenPair};
use crate::error::Error;
use crate::token;
use crate::well_known::ProviderMetadata;

/// OpenID Connect client registration.
///
/// Required fields are constructor parameters; optional ones use `with_*`.
///
/// ```rust,ignore
/// let config = OidcConfig::new("https://idp.example.com/oidc".parse()?, "client-id", "secret")
///     .with_prompt(Some("consent".into()));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OidcConfig {
    pub(crate) issuer: Url,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) scopes: Vec<String>,
    pub(crate) prompt: Option<String>,
    pub(crate) cache_ttl: Duration,
}

impl OidcConfig {
    #[must_use]
    pub fn new(issuer: Url, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            issuer,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: ["openid", "email", "profile", "offline_access"]
                .into_iter()
                .map(String::from)
                .collect(),
            prompt: Some("login consent".into()),
            cache_ttl: Duration::from_secs(3600),
        }
    }

    /// Override the requested scopes (default: `openid email profile offline_access`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Override the `prompt` parameter (default: `login consent`). `None` omits it.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    /// How long a discovered client is reused before re-discovery (default: one hour).
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

/// A discovered OpenID Connect client.
pub struct OidcClient {
    config: OidcConfig,
    metadata: ProviderMetadata,
    keys: JwkSet,
    http: reqwest::Client,
}

impl OidcClient {
    /// Fetch the provider metadata and signing keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, [`Error::OAuth`] on a
    /// non-success status, or [`Error::Discovery`] if the advertised issuer
    /// does not match the configured one.
    pub async fn discover(config: OidcConfig, http: reqwest::Client) -> Result<Self, Error> {
        let discovery_url = ProviderMetadata::discovery_url(&config.issuer)?;
        let response = http.get(discovery_url).send().await?;
        let metadata: ProviderMetadata = ensure_success(response, "discovery")
            .await?
            .json()
            .await?;

        if !metadata.issuer_matches(&config.issuer) {
            return Err(Error::Discovery(format!(
                "issuer mismatch: expected '{}', got '{}'",
                config.issuer, metadata.issuer
            )));
        }

        let response = http.get(metadata.jwks_uri.clone()).send().await?;
        let keys: JwkSet = ensure_success(response, "jwks fetch").await?.json().await?;

        tracing::info!(issuer = %metadata.issuer, keys = keys.keys.len(), "OIDC provider discovered");

        Ok(Self {
            config,
            metadata,
            keys,
            http,
        })
    }

    #[must_use]
    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    /// Authorization URL for the code flow with a PKCE S256 challenge.
    #[must_use]
    pub fn authorization_url(&self, redirect_uri: &Url, state: &str, code_challenge: &str) -> Url {
        let scope = self.config.scopes.join(" ");

        let mut url = self.metadata.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("scope", &scope)
                .append_pair("state", state)
                .append_pair("code_challenge", code_challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(prompt) = &self.config.prompt {
                query.append_pair("prompt", prompt);
            }
        }
        url
    }

    /// Exchange an authorization code for tokens and verified claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, [`Error::OAuth`] if the token
    /// endpoint refuses, or [`Error::IdToken`] if the ID token is absent or invalid.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &Url,
    ) -> Result<ProviderGrant, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];
        let response = self.token_request(&params, "token exchange").await?;
        self.grant_from(response, None)
    }

    /// Redeem a refresh token.
    ///
    /// A response without a new refresh token keeps the one that was redeemed.
    ///
    /// # Errors
    ///
    /// Same as [`exchange_code`](Self::exchange_code).
    pub async fn refresh(&self, refresh_token: &str) -> Result<ProviderGrant, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let response = self.token_request(&params, "token refresh").await?;
        self.grant_from(response, Some(refresh_token))
    }

    /// End-session URL carrying `client_id` and `post_logout_redirect_uri`.
    pub fn end_session_url(&self, post_logout_redirect_uri: &str) -> Result<Url, Error> {
        let mut url = self.metadata.end_session_endpoint()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        Ok(url)
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(self.metadata.token_endpoint.clone())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await?;

        let response = ensure_success(response, operation).await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    fn grant_from(
        &self,
        response: TokenResponse,
        previous_refresh_token: Option<&str>,
    ) -> Result<ProviderGrant, Error> {
        let id_token = response
            .id_token
            .ok_or_else(|| Error::IdToken("token response carried no id_token".into()))?;

        let claims = token::verify_id_token(
            &id_token,
            &self.keys,
            &self.config.client_secret,
            &self.metadata.issuer,
            &self.config.client_id,
        )?;

        let refresh_token = response
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_owned));

        Ok(ProviderGrant {
            claims,
            tokens: TokenPair {
                access_token: response.access_token,
                refresh_token,
            },
        })
    }
}

/// Returns the response on success, or an error carrying status and body.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let detail = response.text().await.unwrap_or_default();
    Err(Error::OAuth {
        operation,
        status,
        detail,
    })
}
