//! OpenID Connect login sessions for axum applications.
//!
//! The crate runs the authorization-code flow (with PKCE) against a
//! discovered provider, keeps the resulting claims and tokens in a
//! server-side session, and guards routes with an access check that
//! refreshes an expired session when a refresh token allows it.
//!
//! - [`provider`]: the [`IdentityProvider`] seam and the cached, lazily
//!   discovered [`ProviderCache`].
//! - [`session`]: [`SessionRecord`] and the [`SessionManager`] that creates
//!   and refreshes it.
//! - [`guard`]: the access state machine and the single-flight [`AccessGuard`].
//! - [`store`]: session and user persistence.
//! - [`middleware`]: routes, cookies and the `require_auth` layer.

pub mod claims;
pub mod error;
pub mod guard;
pub mod middleware;
pub mod oidc;
pub mod pkce;
pub mod provider;
pub mod session;
pub mod store;
pub mod token;
pub mod types;
pub mod well_known;

// Re-exports for convenient access
pub use claims::{IdentityClaims, ProviderGrant, TokenPair};
pub use error::Error;
pub use guard::{Access, AccessGuard, GuardState, classify, evaluate};
pub use oidc::{OidcClient, OidcConfig};
pub use pkce::{LoginChallenge, code_challenge_s256, generate_code_verifier, generate_state};
pub use provider::{IdentityProvider, ProviderCache};
pub use session::{RefreshFailure, SessionManager, SessionRecord, UpsertFailure};
pub use store::{SessionStore, StoreError, UserStore};
pub use types::{SessionId, SubjectId, UserProfile};
pub use well_known::ProviderMetadata;
