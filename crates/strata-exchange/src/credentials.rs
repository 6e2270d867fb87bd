//! API credentials with secret hygiene.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// API key pair for the exchange.
///
/// The secret is zeroized on drop and excluded from Debug output so it
/// never leaks through logs or panics.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ApiCredentials {
    api_key: String,
    secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }

    /// Load from `STRATA_API_KEY` / `STRATA_API_SECRET`.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("STRATA_API_KEY").ok()?;
        let secret = std::env::var("STRATA_API_SECRET").ok()?;
        Some(Self::new(api_key, secret))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Expose the secret for signing. Callers must not store the result.
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &format!("{}...", &self.api_key.chars().take(4).collect::<String>()))
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let creds = ApiCredentials::new("abcdef123456", "topsecret");
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("topsecret"));
        assert!(dbg.contains("abcd"));
    }
}
