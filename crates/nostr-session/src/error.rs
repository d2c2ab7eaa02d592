//! Error types for nostr-session.

use nostr_crypto::CryptoError;
use thiserror::Error;

/// Errors raised by the relay session, router and publisher.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed key, signature or identity supplied by the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// Relay sent something that does not parse as a known message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connect, send or receive on the socket failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("missing env var: {0}")]
    MissingEnv(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("operation timed out")]
    Timeout,
}

impl SessionError {
    /// Transport failures end the session; everything else is per-message.
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_fatal() {
        assert!(SessionError::Transport("reset".to_string()).is_transport());
        assert!(!SessionError::Protocol("bad json".to_string()).is_transport());
        assert!(!SessionError::Timeout.is_transport());
    }
}
