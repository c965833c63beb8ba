//! Error types for OAuth authentication operations

use std::time::Duration;

/// Errors from discovery, the login flow, and the stored-credential lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("endpoint discovery failed: {0}")]
    Discovery(String),

    #[error("client registration failed: {0}")]
    Registration(String),

    #[error("callback listener failed: {0}")]
    Listener(String),

    #[error("state mismatch during OAuth callback, aborting")]
    StateMismatch,

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("no authorization code received")]
    MissingCode,

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("timed out after {}s waiting for the browser redirect", .0.as_secs())]
    LoginTimeout(Duration),

    #[error("not authenticated, run `flowctl login` first")]
    NotAuthenticated,

    #[error("no refresh token available, run `flowctl login` again")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

impl Error {
    /// Whether the user can recover by running the login flow again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Error::NotAuthenticated | Error::NoRefreshToken | Error::CredentialParse(_)
        )
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
