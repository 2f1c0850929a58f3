//! Error type definitions.

use serde::{Deserialize, Serialize};
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Categories of lookup failure.
///
/// The kind drives the recovery policy in the pool manager: retryable kinds
/// rotate to the next credential, non-retryable kinds fail the lookup
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad credential format, malformed URL, or HTTP 400 from the provider.
    InvalidRequest,
    /// HTTP 401 from the provider.
    Unauthorized,
    /// Provider signals a daily/monthly limit was met.
    QuotaExceeded,
    /// HTTP 429 or a rate-limit message from the provider.
    RateLimited,
    /// Local abort deadline reached.
    Timeout,
    /// Transport failure or an unclassified HTTP 5xx.
    NetworkError,
    /// Malformed JSON or a body missing required provider fields.
    ParseError,
    /// Anything that doesn't fit the categories above.
    Unknown,
    /// No credential satisfies selection.
    AllExhausted,
}

impl ErrorKind {
    /// Whether a failure of this kind should rotate to another credential.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::Timeout
                | ErrorKind::NetworkError
                | ErrorKind::ParseError
                | ErrorKind::QuotaExceeded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::Unknown => "unknown",
            ErrorKind::AllExhausted => "all_exhausted",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for database operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreation(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// A lookup failure with its category and a human-readable message.
///
/// The upstream cause, when known, is attached as the error source so callers
/// in development mode can surface the full chain.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TrackError {
    pub kind: ErrorKind,
    pub message: String,
    /// Credential that served the failing attempt, when one was involved.
    pub credential_id: Option<String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TrackError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        TrackError {
            kind,
            message: message.into(),
            credential_id: None,
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        TrackError {
            kind,
            message: message.into(),
            credential_id: None,
            source: Some(Box::new(source)),
        }
    }

    pub fn with_credential(mut self, id: impl Into<String>) -> Self {
        self.credential_id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(ErrorKind::ParseError.is_retryable());
        assert!(ErrorKind::QuotaExceeded.is_retryable());

        assert!(!ErrorKind::InvalidRequest.is_retryable());
        assert!(!ErrorKind::Unauthorized.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
        assert!(!ErrorKind::AllExhausted.is_retryable());
    }

    #[test]
    fn test_serde_tags_are_snake_case() {
        let json = serde_json::to_string(&ErrorKind::QuotaExceeded).unwrap();
        assert_eq!(json, "\"quota_exceeded\"");
        let back: ErrorKind = serde_json::from_str("\"rate_limited\"").unwrap();
        assert_eq!(back, ErrorKind::RateLimited);
    }

    #[test]
    fn test_every_kind_has_a_stable_tag() {
        for kind in ErrorKind::iter() {
            let tag = kind.as_str();
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{tag}\""));
        }
    }

    #[test]
    fn test_track_error_display() {
        let err = TrackError::new(ErrorKind::AllExhausted, "no credential available");
        assert_eq!(err.to_string(), "all_exhausted: no credential available");
    }
}
