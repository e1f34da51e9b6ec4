//! Model training: fine-tune the base checkpoint on the tokenized dataset.

use super::transformation::DatasetManifest;
use super::{finish, Stage, StageContext};
use crate::backend::{TrainingArguments, TrainingJob};
use crate::core::{
    require_non_empty_dir, sha256_file, ArtifactKind, StageArtifact, StageId, StageOutput,
};
use crate::errors::Result;
use crate::utils::list_files_recursive;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// A file produced by training, with its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainedFile {
    /// Kind of artifact (model or tokenizer).
    pub kind: ArtifactKind,
    /// Path relative to the trainer directory.
    pub path: PathBuf,
    /// Hex sha256.
    pub sha256: String,
}

/// Record of one training run, written next to the saved model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingManifest {
    /// Run id.
    pub run_id: String,
    /// When training finished.
    pub created_at: DateTime<Utc>,
    /// Base checkpoint.
    pub model_ckpt: String,
    /// Hyperparameters used.
    pub args: TrainingArguments,
    /// Rows per dataset split.
    pub dataset: DatasetManifest,
    /// Every saved file.
    pub artifacts: Vec<TrainedFile>,
}

impl TrainingManifest {
    /// Reads a manifest file.
    pub fn read(path: &Path) -> Result<Self> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }
}

fn hash_dir(kind: ArtifactKind, dir: &Path, base: &Path) -> Result<Vec<TrainedFile>> {
    list_files_recursive(dir)?
        .into_iter()
        .map(|file| {
            Ok(TrainedFile {
                kind,
                sha256: sha256_file(&file)?,
                path: file.strip_prefix(base).unwrap_or(&file).to_path_buf(),
            })
        })
        .collect()
}

/// Fine-tunes the model through the configured backend.
#[derive(Debug, Default)]
pub struct ModelTrainingStage;

impl ModelTrainingStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let config = ctx.config();
        let layout = ctx.layout();

        let dataset_dir = layout.transformed_dir();
        let dataset = DatasetManifest::read(&dataset_dir)?;
        let output_dir = layout.ensure_stage_dir(StageId::Training)?;

        let job = TrainingJob {
            model_ckpt: config.training.model_ckpt.clone(),
            dataset_dir,
            output_dir: output_dir.clone(),
            model_dir: layout.trained_model_dir(),
            tokenizer_dir: layout.trained_tokenizer_dir(),
            args: config.training.args.clone(),
        };

        info!(
            model_ckpt = %job.model_ckpt,
            backend = %ctx.backend().name(),
            rows = ?dataset.num_rows,
            "model training started"
        );
        ctx.backend().train(&job).await?;
        info!("model training completed");

        require_non_empty_dir(&job.model_dir)?;
        require_non_empty_dir(&job.tokenizer_dir)?;

        let mut artifacts = hash_dir(ArtifactKind::Model, &job.model_dir, &output_dir)?;
        artifacts.extend(hash_dir(ArtifactKind::Tokenizer, &job.tokenizer_dir, &output_dir)?);

        let manifest = TrainingManifest {
            run_id: ctx.run_id().to_string(),
            created_at: Utc::now(),
            model_ckpt: job.model_ckpt.clone(),
            args: job.args.clone(),
            dataset,
            artifacts,
        };
        let manifest_path = layout.training_manifest();
        std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;
        info!(path = %manifest_path.display(), files = manifest.artifacts.len(), "saved training manifest");

        Ok(StageOutput::ok_value(
            "model_dir",
            serde_json::Value::String(job.model_dir.display().to_string()),
        )
        .with_value(
            "tokenizer_dir",
            serde_json::Value::String(job.tokenizer_dir.display().to_string()),
        )
        .with_artifact(StageArtifact::new(ArtifactKind::Model, &job.model_dir))
        .with_artifact(StageArtifact::new(ArtifactKind::Tokenizer, &job.tokenizer_dir))
        .with_artifact(StageArtifact::existing(ArtifactKind::Manifest, &manifest_path)?))
    }
}

#[async_trait]
impl Stage for ModelTrainingStage {
    fn id(&self) -> StageId {
        StageId::Training
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.id(), self.run(ctx).await)
    }
}
