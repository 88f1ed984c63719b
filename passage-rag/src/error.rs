//! Error types for the `passage-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building or querying an index.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while calling the completion service.
    #[error("Completion error ({provider}): {message}")]
    CompletionError {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The service rejected the credentials, or none were configured.
    #[error("Authentication error ({provider}): {message}")]
    AuthenticationError {
        /// The provider that rejected the request.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during text chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A persisted index artifact is malformed or internally inconsistent.
    #[error("Index format error: {0}")]
    IndexFormatError(String),

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether this error means retrying with other inputs cannot succeed.
    ///
    /// Authentication problems, configuration problems and cancellation are
    /// fatal: the first embedding call of a build aborts on them instead of
    /// skipping the passage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationError { .. } | Self::ConfigError(_) | Self::Cancelled)
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_and_config_errors_are_fatal() {
        let auth =
            RagError::AuthenticationError { provider: "Yandex".into(), message: "401".into() };
        assert!(auth.is_fatal());
        assert!(RagError::ConfigError("bad".into()).is_fatal());
        assert!(RagError::Cancelled.is_fatal());
    }

    #[test]
    fn service_errors_are_recoverable() {
        let err = RagError::EmbeddingError { provider: "Yandex".into(), message: "timeout".into() };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Embedding error (Yandex): timeout");
    }
}
