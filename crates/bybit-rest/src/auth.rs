//! Request signing for private V5 endpoints
//!
//! Bybit signs `timestamp + api_key + recv_window + query_string` with
//! HMAC-SHA256 and sends the hex digest in the `X-BAPI-SIGN` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// API credentials for private endpoints
#[derive(Clone)]
pub struct Credentials {
    /// API key
    pub api_key: String,
    /// API secret (never logged)
    api_secret: String,
}

impl Credentials {
    /// Create credentials from key and secret
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Load credentials from `BYBIT_API_KEY` / `BYBIT_API_SECRET`
    pub fn from_env() -> Result<Self, std::env::VarError> {
        Ok(Self {
            api_key: std::env::var("BYBIT_API_KEY")?,
            api_secret: std::env::var("BYBIT_API_SECRET")?,
        })
    }

    /// Sign a GET request
    ///
    /// `payload` is the url-encoded query string, exactly as sent.
    pub fn sign(&self, timestamp_ms: i64, recv_window_ms: u32, payload: &str) -> String {
        let message = format!(
            "{}{}{}{}",
            timestamp_ms, self.api_key, recv_window_ms, payload
        );
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let creds = Credentials::new("key", "secret");
        let a = creds.sign(1_700_000_000_000, 5_000, "category=linear&symbol=BTCUSDT");
        let b = creds.sign(1_700_000_000_000, 5_000, "category=linear&symbol=BTCUSDT");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex-encoded SHA-256
    }

    #[test]
    fn test_signature_covers_payload() {
        let creds = Credentials::new("key", "secret");
        let a = creds.sign(1, 5_000, "category=linear");
        let b = creds.sign(1, 5_000, "category=spot");
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("key", "hunter2");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[redacted]"));
    }
}
