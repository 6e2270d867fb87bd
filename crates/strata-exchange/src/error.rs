//! Exchange error taxonomy.
//!
//! The split that matters to callers is transient vs definitive:
//! transient errors are retried with backoff (reusing the same client
//! order id), definitive rejections are surfaced immediately.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Network-level failure (connect, DNS, TLS, reset). Transient.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timed out. Transient.
    #[error("Request timed out")]
    Timeout,

    /// Exchange signalled rate limiting (HTTP 429/418). Transient.
    #[error("Rate limited by exchange")]
    RateLimited,

    /// Server-side failure (HTTP 5xx). Transient.
    #[error("Exchange server error: status={status}, body={body}")]
    Server { status: u16, body: String },

    /// Definitive business rejection: bad parameters, filter violation,
    /// insufficient balance. Never retried.
    #[error("Order rejected by exchange (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// Authentication failure. Definitive.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Response body did not match the expected shape. Definitive.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ExchangeError {
    /// Whether retrying the same request (same idempotency token) makes sense.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout | Self::RateLimited | Self::Server { .. }
        )
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() || e.is_request() {
            Self::Transport(e.to_string())
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::Timeout.is_transient());
        assert!(ExchangeError::RateLimited.is_transient());
        assert!(ExchangeError::Server {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(ExchangeError::Transport("reset".into()).is_transient());

        assert!(!ExchangeError::Rejected {
            code: -2010,
            message: "insufficient balance".into()
        }
        .is_transient());
        assert!(!ExchangeError::Auth("bad key".into()).is_transient());
        assert!(!ExchangeError::InvalidResponse("truncated".into()).is_transient());
    }
}
