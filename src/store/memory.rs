use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{SessionStore, StoreError, UserStore};
use crate::session::SessionRecord;
use crate::types::{SessionId, SubjectId, UserProfile};

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + ttl`, clamped for TTLs too large for `Instant`.
fn expiry(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// In-process session store. Expired entries are dropped when read.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<SessionId, (SessionRecord, Instant)>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let mut entries = self.entries.lock();
        match entries.get(id) {
            Some((record, expires)) if *expires > Instant::now() => Ok(Some(record.clone())),
            Some(_) => {
                entries.remove(id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert(id.clone(), (record.clone(), expiry(ttl)));
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
        self.entries.lock().remove(id);
        Ok(())
    }
}

/// In-process user profile store.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<SubjectId, UserProfile>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    async fn upsert(&self, profile: UserProfile) -> Result<UserProfile, StoreError> {
        self.users.lock().insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    async fn find(&self, id: &SubjectId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.lock().get(id).cloned())
    }
}
