use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::{AuthConfig, AuthSettings};
use crate::guard::AccessGuard;
use crate::provider::IdentityProvider;
use crate::session::SessionManager;
use crate::store::{SessionStore, UserStore};

/// Shared state for the auth routes and the [`require_auth`](super::require_auth) layer.
pub struct AuthState<P, U, S> {
    pub(super) provider: Arc<P>,
    pub(super) manager: SessionManager<P, U>,
    pub(super) sessions: Arc<S>,
    pub(super) guard: Arc<AccessGuard<P, U, S>>,
    pub(super) settings: AuthSettings,
}

impl<P, U, S> AuthState<P, U, S>
where
    P: IdentityProvider,
    U: UserStore,
    S: SessionStore,
{
    #[must_use]
    pub fn new(config: AuthConfig, provider: P, users: U, sessions: S) -> Self {
        let provider = Arc::new(provider);
        let sessions = Arc::new(sessions);
        let manager = SessionManager::new(provider.clone(), Arc::new(users));
        let guard = Arc::new(AccessGuard::new(
            manager.clone(),
            sessions.clone(),
            config.settings.session_ttl,
        ));

        Self {
            provider,
            manager,
            sessions,
            guard,
            settings: config.settings,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    #[must_use]
    pub fn users(&self) -> &U {
        self.manager.users()
    }
}

// Manual Clone: avoid derive adding `P: Clone, U: Clone, S: Clone` bounds.
impl<P, U, S> Clone for AuthState<P, U, S> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            manager: self.manager.clone(),
            sessions: self.sessions.clone(),
            guard: self.guard.clone(),
            settings: self.settings.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<P, U, S> FromRef<AuthState<P, U, S>> for Key {
    fn from_ref(state: &AuthState<P, U, S>) -> Self {
        state.settings.cookie_key.clone()
    }
}
