//! Standardized error handling for the parser validator
//! Provides the error taxonomy shared by the query client, generators and orchestrator

use serde::{Deserialize, Serialize};

/// Serializable error summary attached to failed validation records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorSummary {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error taxonomy for parser validation runs
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("Connectivity error after {elapsed_ms}ms: {message} (query: {query})")]
    Connectivity {
        message: String,
        query: String,
        elapsed_ms: u64,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Backend error after {elapsed_ms}ms: {message} (query: {query})")]
    Backend {
        message: String,
        query: String,
        elapsed_ms: u64,
        status: Option<u16>,
    },

    #[error("Query timed out after {attempts} poll attempts ({elapsed_ms}ms): {query}")]
    Timeout {
        query: String,
        attempts: u32,
        elapsed_ms: u64,
    },

    #[error("Validation of {pair} exceeded {timeout_ms}ms")]
    PairTimeout { pair: String, timeout_ms: u64 },

    #[error("Generation error in '{generator}': {message}")]
    Generation { generator: String, message: String },

    #[error("Unknown generator: {id}")]
    UnknownGenerator { id: String },

    #[error("Invalid query state: {message}")]
    InvalidState { message: String },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl ValidatorError {
    /// Create a connectivity error for a transport failure
    pub fn connectivity<S: Into<String>, Q: Into<String>>(
        message: S,
        query: Q,
        elapsed_ms: u64,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::Connectivity {
            message: message.into(),
            query: query.into(),
            elapsed_ms,
            source,
        }
    }

    /// Create a backend error for a non-success response
    pub fn backend<S: Into<String>, Q: Into<String>>(
        message: S,
        query: Q,
        elapsed_ms: u64,
        status: Option<u16>,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            query: query.into(),
            elapsed_ms,
            status,
        }
    }

    pub fn timeout<Q: Into<String>>(query: Q, attempts: u32, elapsed_ms: u64) -> Self {
        Self::Timeout {
            query: query.into(),
            attempts,
            elapsed_ms,
        }
    }

    pub fn pair_timeout<P: Into<String>>(pair: P, timeout: std::time::Duration) -> Self {
        Self::PairTimeout {
            pair: pair.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn generation<G: Into<String>, S: Into<String>>(generator: G, message: S) -> Self {
        Self::Generation {
            generator: generator.into(),
            message: message.into(),
        }
    }

    pub fn unknown_generator<S: Into<String>>(id: S) -> Self {
        Self::UnknownGenerator { id: id.into() }
    }

    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source
    pub fn configuration_with_source<S: Into<String>>(message: S, source: anyhow::Error) -> Self {
        Self::Configuration {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source
    pub fn internal_with_source<S: Into<String>>(message: S, source: anyhow::Error) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Get the stable error code used in exported records
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connectivity { .. } => "CONNECTIVITY_ERROR",
            Self::Backend { .. } => "BACKEND_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::PairTimeout { .. } => "PAIR_TIMEOUT",
            Self::Generation { .. } => "GENERATION_ERROR",
            Self::UnknownGenerator { .. } => "UNKNOWN_GENERATOR",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Configuration { .. } => "CONFIG_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether the failure happened while talking to the backend
    pub fn is_backend_related(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. } | Self::Backend { .. } | Self::Timeout { .. }
        )
    }

    /// Convert to an ErrorSummary for exported results
    pub fn to_summary(&self) -> ErrorSummary {
        ErrorSummary {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.get_details(),
        }
    }

    fn get_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Connectivity {
                query, elapsed_ms, ..
            } => Some(serde_json::json!({ "query": query, "elapsed_ms": elapsed_ms })),
            Self::Backend {
                query,
                elapsed_ms,
                status,
                ..
            } => Some(serde_json::json!({
                "query": query,
                "elapsed_ms": elapsed_ms,
                "status": status,
            })),
            Self::Timeout {
                query,
                attempts,
                elapsed_ms,
            } => Some(serde_json::json!({
                "query": query,
                "attempts": attempts,
                "elapsed_ms": elapsed_ms,
            })),
            Self::Generation { generator, .. } => {
                Some(serde_json::json!({ "generator": generator }))
            }
            Self::UnknownGenerator { id } => Some(serde_json::json!({ "generator": id })),
            Self::PairTimeout { pair, timeout_ms } => {
                Some(serde_json::json!({ "pair": pair, "timeout_ms": timeout_ms }))
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for ValidatorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Result type alias for validator operations
pub type ValidatorResult<T> = std::result::Result<T, ValidatorError>;

/// Trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> ValidatorResult<T>
    where
        F: FnOnce() -> String;

    fn with_config_context<F>(self, f: F) -> ValidatorResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn with_context<F>(self, f: F) -> ValidatorResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ValidatorError::internal_with_source(f(), e.into()))
    }

    fn with_config_context<F>(self, f: F) -> ValidatorResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ValidatorError::configuration_with_source(f(), e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ValidatorError::timeout("parser = 'x'", 30, 60_000);
        assert_eq!(err.error_code(), "TIMEOUT_ERROR");
        assert!(err.is_backend_related());

        let err = ValidatorError::unknown_generator("nope");
        assert_eq!(err.error_code(), "UNKNOWN_GENERATOR");
        assert!(!err.is_backend_related());
    }

    #[test]
    fn test_backend_error_carries_query_and_elapsed() {
        let err = ValidatorError::backend("HTTP 500", "parser = 'fortigate'", 1234, Some(500));
        let text = err.to_string();
        assert!(text.contains("parser = 'fortigate'"));
        assert!(text.contains("1234ms"));

        let summary = err.to_summary();
        assert_eq!(summary.code, "BACKEND_ERROR");
        let details = summary.details.unwrap();
        assert_eq!(details["status"], 500);
        assert_eq!(details["elapsed_ms"], 1234);
    }

    #[test]
    fn test_error_context() {
        let parsed: Result<u32, std::num::ParseIntError> = "abc".parse::<u32>();
        let err = parsed
            .with_config_context(|| "workers must be numeric".to_string())
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("workers must be numeric"));
    }
}
