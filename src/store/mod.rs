//! Persistence seams for sessions and user profiles.
//!
//! Both traits are implemented by the consumer (or by the bundled
//! [`memory`] and, with the `postgres` feature, [`postgres`] modules).

use std::future::Future;
use std::time::Duration;

use crate::session::SessionRecord;
use crate::types::{SessionId, SubjectId, UserProfile};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemorySessionStore, MemoryUserStore};
#[cfg(feature = "postgres")]
pub use postgres::{PgSessionStore, PgUserStore};

/// Error type returned by store implementations.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Durable user profiles keyed by provider subject id.
///
/// # Example
///
/// ```rust,ignore
/// impl UserStore for MyRepo {
///     async fn upsert(&self, profile: UserProfile) -> Result<UserProfile, StoreError> {
///         self.db.insert_or_update_user(&profile).await?;
///         Ok(profile)
///     }
///
///     async fn find(&self, id: &SubjectId) -> Result<Option<UserProfile>, StoreError> {
///         self.db.user_by_id(id.as_str()).await
///     }
/// }
/// ```
pub trait UserStore: Send + Sync + 'static {
    /// Insert the profile, or update the display fields of an existing one.
    fn upsert(
        &self,
        profile: UserProfile,
    ) -> impl Future<Output = Result<UserProfile, StoreError>> + Send;

    fn find(
        &self,
        id: &SubjectId,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send;
}

/// Server-side session persistence with write-based expiry.
pub trait SessionStore: Send + Sync + 'static {
    /// The record for `id`, or `None` if absent or expired.
    fn load(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<SessionRecord>, StoreError>> + Send;

    /// Insert or replace the record; it expires `ttl` after this write.
    fn save(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove the record. Removing an unknown id is not an error.
    fn destroy(&self, id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;
}
