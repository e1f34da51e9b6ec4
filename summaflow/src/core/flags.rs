//! Status flags persisted between stages.
//!
//! Validation writes a plain-text flag (`Validation status: true`), evaluation
//! writes `{"trained_model_accepted": bool}`. Each is written once per run and
//! read by the stage that follows.

use crate::errors::{Result, SummaflowError};
use serde::{Deserialize, Serialize};
use std::path::Path;

const VALIDATION_PREFIX: &str = "Validation status:";

/// Writes the validation flag, replacing any previous content.
pub fn write_validation_status(path: &Path, status: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{VALIDATION_PREFIX} {status}"))?;
    Ok(())
}

/// Reads the validation flag written by [`write_validation_status`].
pub fn read_validation_status(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Err(SummaflowError::missing_artifact(path));
    }
    let content = std::fs::read_to_string(path)?;
    let value = content
        .trim()
        .strip_prefix(VALIDATION_PREFIX)
        .map(str::trim)
        .ok_or_else(|| {
            SummaflowError::Validation(format!(
                "malformed status file {}: {content:?}",
                path.display()
            ))
        })?;

    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(SummaflowError::Validation(format!(
            "malformed status value {other:?} in {}",
            path.display()
        ))),
    }
}

/// Promotion decision handed from evaluation to the pusher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    /// Whether the freshly trained model replaces the stored best.
    pub trained_model_accepted: bool,
}

impl ModelStatus {
    /// Creates a status for the given decision.
    #[must_use]
    pub fn new(trained_model_accepted: bool) -> Self {
        Self {
            trained_model_accepted,
        }
    }

    /// Writes the status as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reads a status previously written by [`ModelStatus::write`].
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SummaflowError::missing_artifact(path));
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validation_status_file_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data_validation").join("status.txt");

        write_validation_status(&path, false).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Validation status: false"
        );
        assert!(!read_validation_status(&path).unwrap());

        write_validation_status(&path, true).unwrap();
        assert!(read_validation_status(&path).unwrap());
    }

    #[test]
    fn test_validation_status_accepts_python_casing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("status.txt");
        std::fs::write(&path, "Validation status: True\n").unwrap();

        assert!(read_validation_status(&path).unwrap());
    }

    #[test]
    fn test_malformed_validation_status() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("status.txt");
        std::fs::write(&path, "ok").unwrap();

        assert!(matches!(
            read_validation_status(&path),
            Err(SummaflowError::Validation(_))
        ));
    }

    #[test]
    fn test_model_status_json_shape() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model_status.json");

        ModelStatus::new(true).write(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"trained_model_accepted": true}));
        assert_eq!(ModelStatus::read(&path).unwrap(), ModelStatus::new(true));
    }

    #[test]
    fn test_model_status_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = ModelStatus::read(&temp.path().join("model_status.json")).unwrap_err();
        assert!(matches!(err, SummaflowError::MissingArtifact { .. }));
    }
}
