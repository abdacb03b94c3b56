//! Error types for the relay

use thiserror::Error;

/// Relay-wide error type
#[derive(Error, Debug)]
pub enum RelayError {
    /// Provider could not be reached (connection refused, DNS, reset)
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// Provider did not answer within its time bound
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Provider answered with a non-success status
    #[error("API error: {0}")]
    Api(String),

    /// Provider answered with a payload of unexpected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Provider is missing credentials or endpoints
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Cache error: {0}")]
    Cache(String),

    /// Every provider in the fallback chain failed this cycle
    #[error("Data unavailable: all providers failed")]
    DataUnavailable,

    /// Subscriber limit reached
    #[error("Capacity reached: {0}")]
    CapacityReached(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        RelayError::Unreachable(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        RelayError::Timeout(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        RelayError::Api(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        RelayError::Malformed(msg.into())
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        RelayError::NotConfigured(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        RelayError::Cache(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        RelayError::CapacityReached(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::Config(msg.into())
    }

    /// Timeouts and unreachable/erroring providers; expected during outages
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::Unreachable(_) | RelayError::Timeout(_) | RelayError::Api(_)
        )
    }
}

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RelayError::timeout("agent").is_transient());
        assert!(RelayError::unreachable("agent").is_transient());
        assert!(RelayError::api("500").is_transient());
        assert!(!RelayError::malformed("bad json").is_transient());
        assert!(!RelayError::DataUnavailable.is_transient());
    }
}
