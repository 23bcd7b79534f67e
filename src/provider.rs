use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use url::Url;

use crate::claims::ProviderGrant;
use crate::error::Error;
use crate::oidc::{OidcClient, OidcConfig};

/// The identity provider as seen by the session layer.
///
/// [`ProviderCache`] is the production implementation; tests substitute fakes.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Where to send the user agent to log in.
    fn authorization_url(
        &self,
        redirect_uri: &Url,
        state: &str,
        code_challenge: &str,
    ) -> impl Future<Output = Result<Url, Error>> + Send;

    /// Complete the code flow.
    fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &Url,
    ) -> impl Future<Output = Result<ProviderGrant, Error>> + Send;

    /// Trade a refresh token for new tokens and claims.
    fn refresh(&self, refresh_token: &str)
    -> impl Future<Output = Result<ProviderGrant, Error>> + Send;

    /// Provider logout URL that returns the user agent to `post_logout_redirect_uri`.
    fn end_session_url(
        &self,
        post_logout_redirect_uri: &str,
    ) -> impl Future<Output = Result<Url, Error>> + Send;
}

struct CachedClient {
    client: Arc<OidcClient>,
    discovered_at: Instant,
}

impl CachedClient {
    fn fresh(&self, ttl: Duration) -> bool {
        self.discovered_at.elapsed() < ttl
    }
}

/// Process-scoped discovered client.
///
/// Discovery runs lazily on first use and again once the cached client is
/// older than the configured TTL. Callers racing on an empty or stale slot
/// share a single discovery.
pub struct ProviderCache {
    config: OidcConfig,
    http: reqwest::Client,
    slot: RwLock<Option<CachedClient>>,
}

impl ProviderCache {
    #[must_use]
    pub fn new(config: OidcConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            slot: RwLock::new(None),
        }
    }

    /// Use a custom HTTP client (connection pool reuse, timeouts).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// The discovered client, discovering first if needed.
    ///
    /// # Errors
    ///
    /// Propagates any [`OidcClient::discover`] failure; the slot stays empty
    /// (or stale) so the next call retries.
    pub async fn client(&self) -> Result<Arc<OidcClient>, Error> {
        let ttl = self.config.cache_ttl;

        if let Some(cached) = self.slot.read().await.as_ref() {
            if cached.fresh(ttl) {
                return Ok(cached.client.clone());
            }
        }

        let mut slot = self.slot.write().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fresh(ttl) {
                return Ok(cached.client.clone());
            }
        }

        let client = Arc::new(OidcClient::discover(self.config.clone(), self.http.clone()).await?);
        *slot = Some(CachedClient {
            client: client.clone(),
            discovered_at: Instant::now(),
        });
        Ok(client)
    }

    /// Drop the cached client so the next call re-discovers.
    pub async fn invalidate(&self) {
        self.slot.write().await.take();
    }
}

impl IdentityProvider for ProviderCache {
    async fn authorization_url(
        &self,
        redirect_uri: &Url,
        state: &str,
        code_challenge: &str,
    ) -> Result<Url, Error> {
        Ok(self
            .client()
            .await?
            .authorization_url(redirect_uri, state, code_challenge))
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &Url,
    ) -> Result<ProviderGrant, Error> {
        self.client()
            .await?
            .exchange_code(code, code_verifier, redirect_uri)
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderGrant, Error> {
        self.client().await?.refresh(refresh_token).await
    }

    async fn end_session_url(&self, post_logout_redirect_uri: &str) -> Result<Url, Error> {
        self.client()
            .await?
            .end_session_url(post_logout_redirect_uri)
    }
}
