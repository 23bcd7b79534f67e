use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SubjectId;

/// Attributes extracted from a verified ID token.
///
/// A new set replaces the old one on every login and refresh; nothing mutates
/// an existing set in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: SubjectId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "given_name")]
    pub first_name: Option<String>,
    #[serde(default, alias = "family_name")]
    pub last_name: Option<String>,
    #[serde(default, alias = "picture")]
    pub profile_image_url: Option<String>,
    /// Expiration, seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Access token plus optional refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// Tokens stay out of logs.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Result of a successful code exchange or refresh.
#[derive(Debug, Clone)]
pub struct ProviderGrant {
    pub claims: IdentityClaims,
    pub tokens: TokenPair,
}
