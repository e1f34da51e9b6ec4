//! Filesystem layout for pipeline runs.
//!
//! Every training run gets its own timestamped directory under the artifacts
//! root, with one sub-directory per stage:
//!
//! ```text
//! <artifacts_root>/<run_id>/data_ingestion/...
//!                          /data_validation/status.txt
//!                          /data_transformation/<split>.jsonl
//!                          /model_trainer/{model,tokenizer}
//!                          /model_evaluation/{metrics.csv,model_status.json}
//! <artifacts_root>/prediction/{model,tokenizer}
//! ```

use crate::core::StageId;
use crate::errors::Result;
use crate::utils::{run_id_at, Timestamp};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Directory name under the artifacts root used by the prediction cache.
pub const PREDICTION_DIR: &str = "prediction";

/// Resolves per-run and per-stage paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
    run_id: String,
}

impl ArtifactLayout {
    /// Creates a layout for an explicit run id.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            run_id: run_id.into(),
        }
    }

    /// Creates a layout for a new run started at `now`.
    #[must_use]
    pub fn start_run(root: impl Into<PathBuf>, now: Timestamp) -> Self {
        Self::new(root, run_id_at(now))
    }

    /// Finds the most recent run directory under `root`, if any.
    pub fn latest_run(root: &Path) -> Result<Option<Self>> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<String> = None;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if RUN_ID.is_match(&name) && latest.as_ref().map_or(true, |l| name > *l) {
                latest = Some(name);
            }
        }

        Ok(latest.map(|run_id| Self::new(root, run_id)))
    }

    /// The artifacts root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Directory holding everything for this run.
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.root.join(&self.run_id)
    }

    /// Directory owned by one stage.
    #[must_use]
    pub fn stage_dir(&self, stage: StageId) -> PathBuf {
        self.run_dir().join(stage.dir_name())
    }

    /// Creates a stage directory and returns it.
    pub fn ensure_stage_dir(&self, stage: StageId) -> Result<PathBuf> {
        let dir = self.stage_dir(stage);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Where the downloaded dataset archive is stored.
    #[must_use]
    pub fn archive_path(&self, archive_name: &str) -> PathBuf {
        self.stage_dir(StageId::Ingestion).join(archive_name)
    }

    /// Where the archive is unpacked.
    #[must_use]
    pub fn unzip_dir(&self) -> PathBuf {
        self.stage_dir(StageId::Ingestion).join("unzipped")
    }

    /// Directory holding the raw CSV files, optionally nested inside the archive.
    #[must_use]
    pub fn raw_dataset_dir(&self, dataset_subdir: Option<&str>) -> PathBuf {
        match dataset_subdir {
            Some(sub) if !sub.is_empty() => self.unzip_dir().join(sub),
            _ => self.unzip_dir(),
        }
    }

    /// Validation status flag.
    #[must_use]
    pub fn validation_status_file(&self, file_name: &str) -> PathBuf {
        self.stage_dir(StageId::Validation).join(file_name)
    }

    /// Tokenized dataset directory.
    #[must_use]
    pub fn transformed_dir(&self) -> PathBuf {
        self.stage_dir(StageId::Transformation)
    }

    /// Trained model weights directory.
    #[must_use]
    pub fn trained_model_dir(&self) -> PathBuf {
        self.stage_dir(StageId::Training).join("model")
    }

    /// Trained tokenizer directory.
    #[must_use]
    pub fn trained_tokenizer_dir(&self) -> PathBuf {
        self.stage_dir(StageId::Training).join("tokenizer")
    }

    /// Training manifest path.
    #[must_use]
    pub fn training_manifest(&self) -> PathBuf {
        self.stage_dir(StageId::Training).join("training_manifest.json")
    }

    /// Metrics report written by evaluation.
    #[must_use]
    pub fn metrics_file(&self, file_name: &str) -> PathBuf {
        self.stage_dir(StageId::Evaluation).join(file_name)
    }

    /// Promotion decision written by evaluation.
    #[must_use]
    pub fn model_status_file(&self, file_name: &str) -> PathBuf {
        self.stage_dir(StageId::Evaluation).join(file_name)
    }

    /// Where the stored best model's objects under `prefix` are downloaded.
    #[must_use]
    pub fn downloaded_dir(&self, prefix: &str) -> PathBuf {
        self.stage_dir(StageId::Evaluation).join(prefix)
    }

    /// Run-independent prediction cache directory.
    #[must_use]
    pub fn prediction_dir(root: &Path) -> PathBuf {
        root.join(PREDICTION_DIR)
    }
}

#[allow(clippy::expect_used)]
static RUN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}_\d{6}$").expect("run id regex should be valid"));

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn test_stage_paths() {
        let layout = ArtifactLayout::new("/data/artifacts", "20240310_120000");

        assert_eq!(
            layout.stage_dir(StageId::Validation),
            PathBuf::from("/data/artifacts/20240310_120000/data_validation")
        );
        assert_eq!(
            layout.trained_model_dir(),
            PathBuf::from("/data/artifacts/20240310_120000/model_trainer/model")
        );
        assert_eq!(
            layout.downloaded_dir("tokenizer"),
            PathBuf::from("/data/artifacts/20240310_120000/model_evaluation/tokenizer")
        );
    }

    #[test]
    fn test_raw_dataset_dir_with_subdir() {
        let layout = ArtifactLayout::new("/a", "r");
        assert_eq!(layout.raw_dataset_dir(None), layout.unzip_dir());
        assert_eq!(
            layout.raw_dataset_dir(Some("samsum_dataset")),
            layout.unzip_dir().join("samsum_dataset")
        );
    }

    #[test]
    fn test_start_run_uses_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let layout = ArtifactLayout::start_run("/a", now);
        assert_eq!(layout.run_id(), "20240102_030405");
    }

    #[test]
    fn test_latest_run_picks_newest_and_ignores_others() {
        let temp = TempDir::new().unwrap();
        for name in ["20240101_000000", "20240301_101010", "prediction", "20240201_000000"] {
            std::fs::create_dir_all(temp.path().join(name)).unwrap();
        }
        std::fs::write(temp.path().join("20991231_235959"), b"not a dir").unwrap();

        let latest = ArtifactLayout::latest_run(temp.path()).unwrap().unwrap();
        assert_eq!(latest.run_id(), "20240301_101010");
    }

    #[test]
    fn test_latest_run_missing_root() {
        let temp = TempDir::new().unwrap();
        assert!(ArtifactLayout::latest_run(&temp.path().join("absent"))
            .unwrap()
            .is_none());
    }
}
