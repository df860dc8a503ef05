//! Error types for the canvas-vod library.

use thiserror::Error;

/// Errors raised while authenticating against the jAccount identity provider.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The persisted cookie no longer identifies a live session.
    #[error("session expired, re-authentication required")]
    SessionExpired,

    /// The identity provider rejected the username/password pair.
    #[error("incorrect username or password")]
    BadCredentials,

    /// The identity provider rejected the captcha transcription.
    #[error("incorrect captcha")]
    BadCaptcha,

    /// Any other rejection; carries the raw server payload.
    #[error("login rejected: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Returns `true` if the failure can be recovered by re-prompting the
    /// operator (wrong password or wrong captcha).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BadCredentials | Self::BadCaptcha)
    }
}

/// Errors raised while exchanging a Canvas session for a bearer token.
#[derive(Error, Debug)]
pub enum TokenError {
    /// The LTI launch page served a login form instead of a redirect form;
    /// the Canvas session is gone and the caller must re-authenticate.
    #[error("canvas session expired during token exchange")]
    SessionExpired,

    /// The token-resolution endpoint returned a non-zero code.
    #[error("token request rejected: {0}")]
    Rejected(String),
}

/// Errors that can occur during sync and download operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Authentication failure.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Token exchange failure.
    #[error("token exchange failed: {0}")]
    Token(#[from] TokenError),

    /// HTTP transport error (connect failure, timeout, non-2xx status).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A remote response was missing an expected form, header, or field.
    /// The remote contract is assumed stable; any deviation is surfaced.
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// A specialized `Result` type for canvas-vod operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_auth_errors() {
        assert!(AuthError::BadCredentials.is_retryable());
        assert!(AuthError::BadCaptcha.is_retryable());
        assert!(!AuthError::SessionExpired.is_retryable());
        assert!(!AuthError::Unknown("{}".to_string()).is_retryable());
    }

    #[test]
    fn unknown_error_carries_payload() {
        let err = AuthError::Unknown(r#"{"errno":64}"#.to_string());
        assert!(err.to_string().contains(r#""errno":64"#));
    }

    #[test]
    fn token_rejection_carries_message() {
        let err = Error::from(TokenError::Rejected("no permission".to_string()));
        assert!(err.to_string().contains("no permission"));
    }
}
