//! Session records and the manager that creates and refreshes them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::claims::{IdentityClaims, TokenPair};
use crate::error::Error;
use crate::provider::IdentityProvider;
use crate::store::{StoreError, UserStore};
use crate::types::UserProfile;

/// Server-side state of one authenticated session.
///
/// Fields are private: the only writer is [`establish`](Self::establish) and
/// its in-place twin [`replace`](Self::replace), which swap claims and tokens
/// together. The expiry is read from the stored claims, so it cannot drift
/// from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    claims: IdentityClaims,
    tokens: TokenPair,
}

impl SessionRecord {
    #[must_use]
    pub fn establish(claims: IdentityClaims, tokens: TokenPair) -> Self {
        Self { claims, tokens }
    }

    /// Overwrite claims and tokens in one assignment.
    pub fn replace(&mut self, claims: IdentityClaims, tokens: TokenPair) {
        *self = Self::establish(claims, tokens);
    }

    #[must_use]
    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    /// Expiry in seconds since the epoch; mirrors `claims.exp`.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.claims.exp
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.refresh_token.as_deref()
    }
}

/// A session could not be refreshed; the caller must re-authenticate.
#[derive(Debug, thiserror::Error)]
pub enum RefreshFailure {
    #[error("session has no refresh token")]
    MissingRefreshToken,

    /// Rejected (invalid, expired, revoked) or unreachable provider.
    #[error("provider refresh failed: {0}")]
    Provider(#[from] Error),
}

/// The user profile write during login completion failed.
#[derive(Debug, thiserror::Error)]
#[error("user profile upsert failed: {0}")]
pub struct UpsertFailure(#[source] pub StoreError);

/// Turns provider results into session records and keeps them fresh.
pub struct SessionManager<P, U> {
    provider: Arc<P>,
    users: Arc<U>,
}

// Manual Clone: avoid derive adding `P: Clone, U: Clone` bounds.
impl<P, U> Clone for SessionManager<P, U> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            users: self.users.clone(),
        }
    }
}

impl<P: IdentityProvider, U: UserStore> SessionManager<P, U> {
    #[must_use]
    pub fn new(provider: Arc<P>, users: Arc<U>) -> Self {
        Self { provider, users }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn users(&self) -> &U {
        &self.users
    }

    /// Build a session record from a fresh login.
    #[must_use]
    pub fn establish_session(claims: IdentityClaims, tokens: TokenPair) -> SessionRecord {
        SessionRecord::establish(claims, tokens)
    }

    /// Upsert the user's profile from the login claims. Exactly one write per call.
    ///
    /// # Errors
    ///
    /// Returns [`UpsertFailure`] if the user store fails; the login must not
    /// be treated as complete.
    pub async fn complete_login(&self, claims: &IdentityClaims) -> Result<UserProfile, UpsertFailure> {
        let profile = self
            .users
            .upsert(UserProfile::from(claims))
            .await
            .map_err(UpsertFailure)?;
        tracing::debug!(subject = %profile.id, "user profile upserted");
        Ok(profile)
    }

    /// Redeem the session's refresh token and install the new claims and tokens.
    ///
    /// The provider call completes before anything is written, so on failure
    /// `session` is exactly as it was.
    ///
    /// # Errors
    ///
    /// [`RefreshFailure::MissingRefreshToken`] if there is nothing to redeem,
    /// [`RefreshFailure::Provider`] if the provider rejects or cannot be reached.
    pub async fn refresh_session(&self, session: &mut SessionRecord) -> Result<(), RefreshFailure> {
        let refresh_token = session
            .refresh_token()
            .ok_or(RefreshFailure::MissingRefreshToken)?;

        let grant = self.provider.refresh(refresh_token).await?;
        session.replace(grant.claims, grant.tokens);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::store::MemoryUserStore;

    #[test]
    fn establish_mirrors_expiry_from_claims() {
        let session = SessionManager::<FakeProvider, MemoryUserStore>::establish_session(
            claims("user-1", Some(1234)),
            tokens("at", Some("rt")),
        );
        assert_eq!(session.expires_at(), Some(1234));
        assert_eq!(session.tokens().access_token, "at");
        assert_eq!(session.refresh_token(), Some("rt"));
    }

    #[tokio::test]
    async fn refresh_installs_new_claims_and_tokens() {
        let manager = manager(FakeProvider::accepting(2000));
        let mut session = record(999, Some("rt-old"));

        manager.refresh_session(&mut session).await.unwrap();

        assert_eq!(session.expires_at(), Some(2000));
        assert_eq!(session.claims().exp, session.expires_at());
        assert_eq!(session.tokens().access_token, "at-new");
        assert_eq!(session.refresh_token(), Some("rt-new"));
        assert_eq!(manager.provider().calls(), 1);
    }

    #[tokio::test]
    async fn refresh_without_token_fails_and_leaves_session_untouched() {
        let manager = manager(FakeProvider::accepting(2000));
        let mut session = record(999, None);
        let before = session.clone();

        let err = manager.refresh_session(&mut session).await.unwrap_err();

        assert!(matches!(err, RefreshFailure::MissingRefreshToken));
        assert_eq!(session, before);
        assert_eq!(manager.provider().calls(), 0);
    }

    #[tokio::test]
    async fn rejected_refresh_leaves_session_untouched() {
        let manager = manager(FakeProvider::rejecting());
        let mut session = record(999, Some("rt-revoked"));
        let before = session.clone();

        let err = manager.refresh_session(&mut session).await.unwrap_err();

        assert!(matches!(err, RefreshFailure::Provider(Error::OAuth { .. })));
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn complete_login_upserts_once_keyed_by_subject() {
        let manager = SessionManager::new(
            Arc::new(FakeProvider::default()),
            Arc::new(CountingUserStore::default()),
        );
        let login = claims("user-7", Some(5000));

        let profile = manager.complete_login(&login).await.unwrap();
        assert_eq!(profile.id.as_str(), "user-7");
        assert_eq!(manager.users().upserts.load(std::sync::atomic::Ordering::SeqCst), 1);

        let stored = manager.users().find(&login.sub).await.unwrap().unwrap();
        assert_eq!(stored.email.as_deref(), Some("user-7@example.com"));
        assert_eq!(stored.first_name.as_deref(), Some("First"));
    }

    #[tokio::test]
    async fn upsert_failure_propagates() {
        let manager = SessionManager::new(Arc::new(FakeProvider::default()), Arc::new(BrokenUserStore));
        let result = manager.complete_login(&claims("user-8", Some(1))).await;
        assert!(result.is_err());
    }

    #[test]
    fn record_survives_json_round_trip_for_stores() {
        let session = record(999, Some("rt"));
        let json = serde_json::to_string(&session).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
        assert_eq!(back.expires_at(), Some(999));
    }
}
