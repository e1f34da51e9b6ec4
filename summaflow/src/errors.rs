//! Error types for the summaflow pipeline.
//!
//! Every stage funnels its failures into [`SummaflowError`]. The pipeline
//! runner wraps a failed stage into [`SummaflowError::StageFailed`], keeping the
//! original message so the REST layer can surface it verbatim.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SummaflowError>;

/// The main error type for summaflow operations.
#[derive(Debug, Error)]
pub enum SummaflowError {
    /// An object storage operation failed.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A dataset archive could not be unpacked.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Tokenizer loading or encoding failed.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// The ML backend reported a failure.
    #[error("Backend '{backend}' failed: {message}")]
    Backend {
        /// Backend name.
        backend: String,
        /// Error reported by the backend.
        message: String,
    },

    /// Data validation rejected the ingested files.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A required artifact from an earlier stage is missing.
    #[error("Missing artifact: {}", path.display())]
    MissingArtifact {
        /// The path that was expected to exist.
        path: PathBuf,
    },

    /// A pipeline stage failed.
    #[error("Stage {stage} failed: {message}")]
    StageFailed {
        /// Stage that failed.
        stage: String,
        /// Original error message.
        message: String,
    },

    /// The pipeline definition is invalid.
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// HTTP download error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SummaflowError {
    /// Creates a backend error.
    #[must_use]
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a missing artifact error.
    #[must_use]
    pub fn missing_artifact(path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact { path: path.into() }
    }

    /// Creates a stage failure error.
    #[must_use]
    pub fn stage_failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Errors related to object storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The object does not exist.
    #[error("Object not found: {bucket}/{key}")]
    NotFound {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },

    /// The store could not be constructed.
    #[error("Storage configuration error: {0}")]
    Configuration(String),

    /// The remote store rejected or failed an operation.
    #[error("Storage operation '{operation}' failed on {bucket}/{key}: {reason}")]
    Operation {
        /// Operation name (put, get, list, head).
        operation: &'static str,
        /// Bucket name.
        bucket: String,
        /// Object key or prefix.
        key: String,
        /// Underlying error message.
        reason: String,
    },

    /// Local file IO during an upload or download failed.
    #[error("Local IO error for {}: {source}", path.display())]
    LocalIo {
        /// Local path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Creates an operation error.
    #[must_use]
    pub fn operation(
        operation: &'static str,
        bucket: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Operation {
            operation,
            bucket: bucket.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a local IO error.
    #[must_use]
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error means the object was absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failed_message_keeps_original() {
        let err = SummaflowError::stage_failed("model_evaluation", "bucket unreachable");
        assert_eq!(
            err.to_string(),
            "Stage model_evaluation failed: bucket unreachable"
        );
    }

    #[test]
    fn test_storage_error_converts() {
        let err: SummaflowError = StorageError::NotFound {
            bucket: "models".to_string(),
            key: "model/config.json".to_string(),
        }
        .into();

        assert!(matches!(err, SummaflowError::Storage(ref e) if e.is_not_found()));
        assert!(err.to_string().contains("models/model/config.json"));
    }

    #[test]
    fn test_missing_artifact_display() {
        let err = SummaflowError::missing_artifact("/tmp/run/model_trainer/model");
        assert!(err.to_string().contains("/tmp/run/model_trainer/model"));
    }

    #[test]
    fn test_backend_error() {
        let err = SummaflowError::backend("command", "exit status 1");
        assert_eq!(err.to_string(), "Backend 'command' failed: exit status 1");
    }
}
