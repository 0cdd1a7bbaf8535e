//! Authentication for the private WebSocket endpoint
//!
//! The private stream authenticates with an `auth` operation carrying
//! `[api_key, expires, signature]` where the signature is
//! HMAC-SHA256(`secret`, `"GET/realtime" + expires`) hex-encoded.

use bybit_types::WsRequest;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Signature validity window for the auth request
const AUTH_WINDOW: Duration = Duration::from_secs(10);

/// Credentials for the private stream
#[derive(Clone)]
pub struct WsCredentials {
    api_key: String,
    api_secret: String,
}

impl WsCredentials {
    /// Create new credentials
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

    /// Build the auth request for the current time
    pub fn auth_request(&self) -> WsRequest {
        let expires = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_add(AUTH_WINDOW)
            .as_millis() as i64;
        self.auth_request_at(expires)
    }

    /// Build the auth request for a fixed expiry (testable)
    pub fn auth_request_at(&self, expires_ms: i64) -> WsRequest {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(format!("GET/realtime{expires_ms}").as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        WsRequest {
            op: "auth",
            args: vec![self.api_key.clone(), expires_ms.to_string(), signature],
            req_id: None,
        }
    }
}

impl std::fmt::Debug for WsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_request_shape() {
        let creds = WsCredentials::new("key", "secret");
        let req = creds.auth_request_at(1_700_000_000_000);
        assert_eq!(req.op, "auth");
        assert_eq!(req.args.len(), 3);
        assert_eq!(req.args[0], "key");
        assert_eq!(req.args[1], "1700000000000");
        assert_eq!(req.args[2].len(), 64); // hex-encoded SHA-256

        // Same inputs, same signature
        let again = creds.auth_request_at(1_700_000_000_000);
        assert_eq!(req.args[2], again.args[2]);
    }
}
