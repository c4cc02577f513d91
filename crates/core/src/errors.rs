//! Error types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Normalized error classification shared by every layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed caller input. Never retried.
    Validation,
    Network,
    Timeout,
    /// Vendor payload missing required fields or carrying no usable price
    UpstreamData,
    /// Optional credential missing, source skipped
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UpstreamData => "upstream_data",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

/// Request executor errors
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("HTTP {status} from {endpoint}: {message}")]
    Http {
        status: u16,
        endpoint: String,
        message: String,
    },

    #[error("Malformed response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Validation(_) => ErrorKind::Validation,
            RequestError::Timeout { .. } => ErrorKind::Timeout,
            RequestError::Network { .. } => ErrorKind::Network,
            RequestError::Http { status, .. } if (400..500).contains(status) => {
                ErrorKind::Validation
            }
            RequestError::Http { .. } => ErrorKind::Network,
            RequestError::Decode { .. } => ErrorKind::UpstreamData,
        }
    }

    /// Transient failures worth another attempt: timeouts, transport errors,
    /// 5xx, 408 and 429. Other 4xx and decode failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            RequestError::Timeout { .. } | RequestError::Network { .. } => true,
            RequestError::Http { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            RequestError::Validation(_) | RequestError::Decode { .. } => false,
        }
    }
}

/// Source adapter errors
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("{source_name} returned unusable data: {message}")]
    UpstreamData {
        source_name: &'static str,
        message: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl SourceError {
    pub fn upstream(source_name: &'static str, message: impl Into<String>) -> Self {
        SourceError::UpstreamData {
            source_name,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Request(e) => e.kind(),
            SourceError::UpstreamData { .. } => ErrorKind::UpstreamData,
            SourceError::NotConfigured(_) => ErrorKind::Configuration,
            SourceError::InvalidAddress(_) => ErrorKind::Validation,
        }
    }

    /// A transport-level failure that may clear up on another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Request(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Errors surfaced by the public price API.
///
/// "No price available" is never an error: it is `Ok(None)`.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Validation error: {0}")]
    Validation(String),
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OracleError::Validation(_) => ErrorKind::Validation,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias
pub type OracleResult<T> = Result<T, OracleError>;
pub type RequestResult<T> = Result<T, RequestError>;
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> RequestError {
        RequestError::Http {
            status,
            endpoint: "https://example.test/price".to_string(),
            message: String::new(),
        }
    }

    #[test]
    fn test_client_errors_are_final() {
        assert!(!http(400).is_retryable());
        assert!(!http(404).is_retryable());
        assert_eq!(http(422).kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(http(502).is_retryable());
        assert!(http(429).is_retryable());
        assert!(RequestError::Timeout {
            endpoint: "x".into(),
            timeout_ms: 10
        }
        .is_retryable());
    }

    #[test]
    fn test_source_error_kinds() {
        assert_eq!(SourceError::NotConfigured("market-data").kind(), ErrorKind::Configuration);
        assert_eq!(SourceError::upstream("dex-index", "no pairs").kind(), ErrorKind::UpstreamData);
        assert_eq!(SourceError::from(http(503)).kind(), ErrorKind::Network);
    }

    #[test]
    fn test_source_error_transience() {
        assert!(SourceError::from(http(503)).is_transient());
        assert!(!SourceError::from(http(404)).is_transient());
        assert!(!SourceError::upstream("dex-index", "no pairs").is_transient());
        assert!(!SourceError::InvalidAddress("0xabc".into()).is_transient());
    }
}
