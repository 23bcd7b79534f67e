/// Errors raised while talking to the identity provider.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("{operation} failed (status {status}): {detail}")]
    OAuth {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("ID token error: {0}")]
    IdToken(String),
}
