//! Plug-and-play OIDC authentication for Axum.
//!
//! Mounts login, callback and logout routes, keeps sessions server-side
//! behind an encrypted cookie, and guards routes with [`require_auth`],
//! which refreshes expired sessions when it can.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use oidc_portal::middleware::{AuthConfig, AuthState, auth_routes, require_auth};
//! use oidc_portal::ProviderCache;
//!
//! let config = AuthConfig::from_env()?;
//! let provider = ProviderCache::new(config.oidc().clone());
//! let state = AuthState::new(config, provider, user_store, session_store);
//!
//! let app = axum::Router::new()
//!     .route("/api/things", get(list_things))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
//!     .merge(auth_routes(state));
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod guard;
mod routes;
mod state;

pub use config::AuthConfig;
pub use error::AuthError;
pub use extractor::CurrentSession;
pub use guard::require_auth;
pub use routes::auth_routes;
pub use state::AuthState;

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
