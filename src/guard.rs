//! The per-request access decision.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::provider::IdentityProvider;
use crate::session::{SessionManager, SessionRecord};
use crate::store::{SessionStore, UserStore};
use crate::types::SessionId;

/// Where a request's session stands at the moment of the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// No session, or a session without an expiry.
    NoSession,
    /// `now <= expiry`.
    Valid,
    /// Expired, but a refresh token is available.
    ExpiredRefreshable,
    /// Expired with no way back short of logging in again.
    ExpiredTerminal,
}

/// Classify a session at `now` (seconds since the epoch). The expiry second itself is still valid.
#[must_use]
pub fn classify(session: Option<&SessionRecord>, now: i64) -> GuardState {
    let Some(session) = session else {
        return GuardState::NoSession;
    };
    let Some(expires_at) = session.expires_at() else {
        return GuardState::NoSession;
    };

    if now <= expires_at {
        GuardState::Valid
    } else if session.refresh_token().is_some() {
        GuardState::ExpiredRefreshable
    } else {
        GuardState::ExpiredTerminal
    }
}

/// How an admitted request got through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Valid,
    Refreshed,
}

/// Run the state machine on one session, refreshing in place when it is
/// expired but refreshable.
///
/// A valid session is never touched, so repeated calls are free of side
/// effects. On a failed refresh the session is unchanged and the result is
/// [`GuardState::ExpiredTerminal`].
///
/// # Errors
///
/// The rejecting state: `NoSession` or `ExpiredTerminal`.
pub async fn evaluate<P: IdentityProvider, U: UserStore>(
    manager: &SessionManager<P, U>,
    session: Option<&mut SessionRecord>,
    now: i64,
) -> Result<Access, GuardState> {
    let Some(session) = session else {
        return Err(GuardState::NoSession);
    };

    match classify(Some(&*session), now) {
        GuardState::Valid => Ok(Access::Valid),
        GuardState::ExpiredRefreshable => match manager.refresh_session(session).await {
            Ok(()) => Ok(Access::Refreshed),
            Err(e) => {
                tracing::info!(error = %e, subject = %session.claims().sub, "session refresh failed");
                Err(GuardState::ExpiredTerminal)
            }
        },
        rejected => Err(rejected),
    }
}

/// One async lock per session id, held while that session refreshes.
#[derive(Default)]
struct RefreshLocks {
    locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RefreshLocks {
    fn acquire(&self, id: &SessionId) -> RefreshSlot<'_> {
        let lock = self.locks.lock().entry(id.clone()).or_default().clone();
        RefreshSlot {
            locks: self,
            id: id.clone(),
            lock,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// A claim on one session's refresh lock. Dropping it, including when the
/// owning request is cancelled, forgets the map entry once nobody else holds it.
struct RefreshSlot<'a> {
    locks: &'a RefreshLocks,
    id: SessionId,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl RefreshSlot<'_> {
    fn mutex(&self) -> &tokio::sync::Mutex<()> {
        &self.lock
    }
}

impl Drop for RefreshSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.locks.lock();
        // The map's handle plus ours.
        if locks
            .get(&self.id)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2)
        {
            locks.remove(&self.id);
        }
    }
}

/// The access guard bound to a session store.
///
/// Requests for the same session that find it expired refresh one at a
/// time: the first refreshes and saves, later ones reload the saved record
/// and see it valid.
pub struct AccessGuard<P, U, S> {
    manager: SessionManager<P, U>,
    sessions: Arc<S>,
    session_ttl: Duration,
    refresh_locks: RefreshLocks,
}

impl<P, U, S> AccessGuard<P, U, S>
where
    P: IdentityProvider,
    U: UserStore,
    S: SessionStore,
{
    #[must_use]
    pub fn new(manager: SessionManager<P, U>, sessions: Arc<S>, session_ttl: Duration) -> Self {
        Self {
            manager,
            sessions,
            session_ttl,
            refresh_locks: RefreshLocks::default(),
        }
    }

    /// Decide whether the request carrying `session_id` may proceed at `now`.
    ///
    /// Returns the (possibly refreshed) record on success. Store failures are
    /// logged and reported as `NoSession`.
    ///
    /// # Errors
    ///
    /// The rejecting [`GuardState`].
    pub async fn authorize(
        &self,
        session_id: Option<&SessionId>,
        now: i64,
    ) -> Result<SessionRecord, GuardState> {
        let Some(id) = session_id else {
            return Err(GuardState::NoSession);
        };

        let record = self.load(id).await?;
        match classify(record.as_ref(), now) {
            GuardState::Valid => return record.ok_or(GuardState::NoSession),
            GuardState::ExpiredRefreshable => {}
            rejected => return Err(rejected),
        }

        let slot = self.refresh_locks.acquire(id);
        let _held = slot.mutex().lock().await;
        self.refresh_locked(id, now).await
    }

    async fn refresh_locked(&self, id: &SessionId, now: i64) -> Result<SessionRecord, GuardState> {
        // A request that held the lock before us may already have refreshed.
        let mut record = self.load(id).await?;

        match evaluate(&self.manager, record.as_mut(), now).await? {
            Access::Valid => {}
            Access::Refreshed => {
                let Some(refreshed) = record.as_ref() else {
                    return Err(GuardState::NoSession);
                };
                if let Err(e) = self.sessions.save(id, refreshed, self.session_ttl).await {
                    tracing::error!(error = %e, session_id = %id, "saving refreshed session failed");
                    return Err(GuardState::ExpiredTerminal);
                }
                tracing::debug!(session_id = %id, "session refreshed");
            }
        }
        record.ok_or(GuardState::NoSession)
    }

    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, GuardState> {
        self.sessions.load(id).await.map_err(|e| {
            tracing::error!(error = %e, session_id = %id, "session lookup failed");
            GuardState::NoSession
        })
    }
}
