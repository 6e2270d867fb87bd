//! HMAC-SHA256 request signing.

use crate::credentials::ApiCredentials;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Request signer for authenticated exchange calls.
pub struct RequestSigner<'a> {
    credentials: &'a ApiCredentials,
}

impl<'a> RequestSigner<'a> {
    pub fn new(credentials: &'a ApiCredentials) -> Self {
        Self { credentials }
    }

    /// HMAC-SHA256 of the message, lowercase hex.
    pub fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.credentials.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build a signed query string from parameters.
    ///
    /// Appends the timestamp, joins `key=value` pairs in the given order,
    /// signs the result, and appends the signature parameter.
    pub fn sign_params(&self, params: &[(&str, String)], timestamp_ms: i64) -> String {
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("timestamp={timestamp_ms}"));

        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_deterministic() {
        let creds = ApiCredentials::new("key", "secret");
        let signer = RequestSigner::new(&creds);
        let a = signer.sign("symbol=BTCUSDT&side=BUY");
        let b = signer.sign("symbol=BTCUSDT&side=BUY");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // SHA-256 hex
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_params_layout() {
        let creds = ApiCredentials::new("key", "secret");
        let signer = RequestSigner::new(&creds);
        let query = signer.sign_params(
            &[("symbol", "BTCUSDT".to_string()), ("side", "BUY".to_string())],
            1_700_000_000_000,
        );
        assert!(query.starts_with("symbol=BTCUSDT&side=BUY&timestamp=1700000000000&signature="));
    }

    #[test]
    fn test_sign_params_empty() {
        let creds = ApiCredentials::new("key", "secret");
        let signer = RequestSigner::new(&creds);
        let query = signer.sign_params(&[], 1000);
        assert!(query.starts_with("timestamp=1000&signature="));
    }
}
