//! Error types for the remote music API client.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Failures raised while talking to the remote music API.
#[derive(Error, Debug)]
pub enum NeteaseError {
    /// The HTTP bridge failed (connection, timeout, TLS).
    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),

    /// The envelope carried a code outside the accepted set.
    #[error("Remote rejected request with status {status}")]
    Remote { status: i64 },

    /// Request encryption failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The response body was not the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl NeteaseError {
    /// Network-level failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            NeteaseError::Transport(e) => e.is_transient(),
            _ => false,
        }
    }

    /// The server answered, but refused.
    pub fn is_remote_rejection(&self) -> bool {
        matches!(self, NeteaseError::Remote { .. })
    }
}

impl From<serde_json::Error> for NeteaseError {
    fn from(err: serde_json::Error) -> Self {
        NeteaseError::Parse(err.to_string())
    }
}

impl From<NeteaseError> for BridgeError {
    fn from(err: NeteaseError) -> Self {
        match err {
            NeteaseError::Transport(inner) => inner,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, NeteaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(NeteaseError::Transport(BridgeError::Timeout(8000)).is_transient());
        assert!(!NeteaseError::Remote { status: 301 }.is_transient());
        assert!(NeteaseError::Remote { status: 301 }.is_remote_rejection());
    }

    #[test]
    fn test_bridge_conversion_keeps_transport_error() {
        let err: BridgeError = NeteaseError::Transport(BridgeError::Timeout(8000)).into();
        assert!(matches!(err, BridgeError::Timeout(8000)));

        let err: BridgeError = NeteaseError::Remote { status: 400 }.into();
        assert!(err.to_string().contains("400"));
    }
}
