//! Relay error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Listen key error: {0}")]
    ListenKey(String),

    #[error("Reconciliation failed: {0}")]
    Reconcile(String),

    #[error("Payload parse error: {0}")]
    Parse(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;
