//! Stage artifacts: files and directories handed from one stage to the next.

use crate::errors::{Result, SummaflowError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Downloaded dataset archive.
    Archive,
    /// Unpacked raw dataset directory.
    RawDataset,
    /// Tokenized dataset directory.
    TokenizedDataset,
    /// Model weights and config.
    Model,
    /// Tokenizer files.
    Tokenizer,
    /// Status flag written for a downstream stage.
    StatusFlag,
    /// Metric report.
    Report,
    /// Training manifest.
    Manifest,
}

/// An artifact produced by a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageArtifact {
    /// The type of artifact.
    pub kind: ArtifactKind,

    /// Local path of the file or directory.
    pub path: PathBuf,

    /// Content hash for single files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// When the artifact was recorded (ISO 8601).
    pub created_at: String,
}

impl StageArtifact {
    /// Records an artifact without hashing it.
    #[must_use]
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            sha256: None,
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Records an artifact that must already exist on disk.
    ///
    /// Files are hashed; directories are only checked for existence.
    pub fn existing(kind: ArtifactKind, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(SummaflowError::missing_artifact(path));
        }

        let sha256 = if path.is_file() {
            Some(sha256_file(&path)?)
        } else {
            None
        };

        Ok(Self {
            kind,
            path,
            sha256,
            created_at: crate::utils::iso_timestamp(),
        })
    }

    /// Converts the artifact to a JSON value for stage output data.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "path": self.path.display().to_string(),
            "sha256": self.sha256,
            "created_at": self.created_at,
        })
    }
}

/// Hex-encoded sha256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Fails with [`SummaflowError::MissingArtifact`] unless `path` exists.
pub fn require_artifact(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(SummaflowError::missing_artifact(path))
    }
}

/// Fails unless `path` is a directory with at least one entry.
pub fn require_non_empty_dir(path: &Path) -> Result<()> {
    require_artifact(path)?;
    let mut entries = std::fs::read_dir(path)?;
    if entries.next().is_none() {
        return Err(SummaflowError::missing_artifact(path));
    }
    Ok(())
}
