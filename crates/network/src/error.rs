//! Error types for network operations

use thiserror::Error;

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors that can occur during network operations
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Request could not be sent or the connection broke
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not the expected JSON
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// Network unavailable
    #[error("Network is unavailable")]
    NetworkUnavailable,

    /// Resilience error
    #[error("{0}")]
    Resilience(#[from] fieldsync_resilience::ResilienceError),
}

impl NetworkError {
    /// Returns true if repeating the same request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            NetworkError::Status { status, .. } => *status >= 500 || *status == 429,
            NetworkError::NetworkUnavailable => true,
            _ => false,
        }
    }

    /// HTTP status of the response, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Status { status, .. } => Some(*status),
            NetworkError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if the error is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns true if the error is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }

    /// Returns true if the circuit breaker rejected the request
    pub fn is_circuit_open(&self) -> bool {
        matches!(
            self,
            NetworkError::Resilience(fieldsync_resilience::ResilienceError::CircuitOpen { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::InvalidUrl("test".to_string());
        assert!(err.to_string().contains("Invalid URL"));

        let err = NetworkError::Status {
            status: 409,
            body: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 409: version mismatch");
    }

    #[test]
    fn test_status_classification() {
        let conflict = NetworkError::Status {
            status: 409,
            body: String::new(),
        };
        assert!(conflict.is_client_error());
        assert!(!conflict.is_retryable());

        let unavailable = NetworkError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(unavailable.is_server_error());
        assert!(unavailable.is_retryable());

        let throttled = NetworkError::Status {
            status: 429,
            body: String::new(),
        };
        assert!(throttled.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(NetworkError::NetworkUnavailable.is_retryable());
        assert!(!NetworkError::InvalidUrl("test".to_string()).is_retryable());
        assert!(!NetworkError::Decode("eof".to_string()).is_retryable());
    }
}
