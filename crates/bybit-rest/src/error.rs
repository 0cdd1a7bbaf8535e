//! Error types for the REST client

use thiserror::Error;

/// Result alias for REST operations
pub type RestResult<T> = Result<T, RestError>;

/// Errors from REST API calls
#[derive(Error, Debug)]
pub enum RestError {
    /// Network or HTTP-level error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned a non-zero retCode
    #[error("API error {code}: {message}")]
    Api {
        /// Bybit retCode
        code: i64,
        /// Bybit retMsg
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Private endpoint called without credentials
    #[error("Authentication required: no credentials configured")]
    AuthRequired,
}

impl RestError {
    /// Returns true if retrying the same request may succeed
    ///
    /// Rate-limit and server-side retCodes are retryable; parameter and
    /// auth errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            // 10006 = rate limit, 10016 = server error, 10002 = timestamp drift
            Self::Api { code, .. } => matches!(code, 10002 | 10006 | 10016),
            Self::InvalidResponse(_) | Self::AuthRequired => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_retryability() {
        let rate_limited = RestError::Api {
            code: 10006,
            message: "too many visits".into(),
        };
        assert!(rate_limited.is_retryable());

        let bad_param = RestError::Api {
            code: 10001,
            message: "params error".into(),
        };
        assert!(!bad_param.is_retryable());
        assert!(!RestError::AuthRequired.is_retryable());
    }
}
