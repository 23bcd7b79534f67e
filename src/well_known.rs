use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Subset of the OpenID Provider metadata document this crate uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub jwks_uri: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
}

impl ProviderMetadata {
    /// `{issuer}/.well-known/openid-configuration`, tolerating a trailing slash on the issuer.
    pub fn discovery_url(issuer: &Url) -> Result<Url, Error> {
        let base = issuer.as_str().trim_end_matches('/');
        format!("{base}/{DISCOVERY_PATH}")
            .parse()
            .map_err(|e| Error::Discovery(format!("discovery URL: {e}")))
    }

    /// End-session endpoint, falling back to `{issuer}/logout` when the
    /// provider does not advertise one.
    pub fn end_session_endpoint(&self) -> Result<Url, Error> {
        if let Some(url) = &self.end_session_endpoint {
            return Ok(url.clone());
        }
        let base = self.issuer.trim_end_matches('/');
        format!("{base}/logout")
            .parse()
            .map_err(|e| Error::Discovery(format!("end session URL: {e}")))
    }

    pub(crate) fn issuer_matches(&self, issuer: &Url) -> bool {
        self.issuer.trim_end_matches('/') == issuer.as_str().trim_end_matches('/')
    }
}
