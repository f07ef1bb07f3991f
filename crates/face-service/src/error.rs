use common::faces::SearchErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single recognition cycle.
///
/// Only `EmptyImage` and `Decode` abort a cycle; search failures collapse to a
/// zero-match result and save failures are collected into the cycle report.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("image payload is empty")]
    EmptyImage,

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to create save folder {}: {source}", .path.display())]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write image {}: {source}", .path.display())]
    WriteImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// A failed remote face search
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} error: {message}")]
pub struct SearchError {
    pub kind: SearchErrorKind,
    pub message: String,
}

impl SearchError {
    pub fn new(kind: SearchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Invalid or missing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_error_display() {
        let err = SearchError::new(SearchErrorKind::Throttled, "slow down");
        assert_eq!(err.to_string(), "throttled error: slow down");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_search_errors_compare_by_kind_and_message() {
        let err = SearchError::new(SearchErrorKind::AccessDenied, "not authorized");
        assert_eq!(err.clone(), err);
        assert_ne!(err, SearchError::new(SearchErrorKind::Throttled, "not authorized"));
        assert_ne!(err, SearchError::new(SearchErrorKind::AccessDenied, "expired token"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("SAVE_FILE_FORMAT", "expected jpg or png");
        assert_eq!(
            err.to_string(),
            "invalid value for SAVE_FILE_FORMAT: expected jpg or png"
        );
        assert_eq!(
            ConfigError::Missing("REKOGNITION_COLLECTION_ID").to_string(),
            "missing required setting REKOGNITION_COLLECTION_ID"
        );
    }
}
