//! Model evaluation: score the new model against the stored best and decide
//! whether it is promoted.

use super::transformation::{read_split, TokenizedRecord};
use super::{finish, Stage, StageContext};
use crate::backend::{DialogueSample, ScoreRequest};
use crate::core::flags::ModelStatus;
use crate::core::{
    decide_promotion, require_non_empty_dir, ArtifactKind, RougeScores, StageArtifact, StageId,
    StageOutput,
};
use crate::errors::{Result, SummaflowError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Split scored during evaluation.
pub const EVALUATION_SPLIT: &str = "test";

/// Row label of the freshly trained model in the metrics report.
pub const TRAINED_MODEL: &str = "TrainedModel";

/// Row label of the stored best model in the metrics report.
pub const DOWNLOADED_MODEL: &str = "DownloadedModel";

/// One row of the metrics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    /// Which model was scored.
    pub model: String,
    /// Unigram overlap.
    pub rouge1: f64,
    /// Bigram overlap.
    pub rouge2: f64,
    /// Sentence-level LCS.
    #[serde(rename = "rougeL")]
    pub rouge_l: f64,
    /// Summary-level LCS.
    #[serde(rename = "rougeLsum")]
    pub rouge_lsum: f64,
    /// Mean of the four.
    pub average: f64,
}

impl MetricRow {
    /// Builds a row from a score set.
    #[must_use]
    pub fn new(model: impl Into<String>, scores: &RougeScores) -> Self {
        Self {
            model: model.into(),
            rouge1: scores.rouge1,
            rouge2: scores.rouge2,
            rouge_l: scores.rouge_l,
            rouge_lsum: scores.rouge_lsum,
            average: scores.average(),
        }
    }
}

/// Writes the metrics report as CSV.
pub fn write_metrics(path: &Path, rows: &[MetricRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a metrics report written by [`write_metrics`].
pub fn read_metrics(path: &Path) -> Result<Vec<MetricRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize()
        .map(|row| row.map_err(SummaflowError::from))
        .collect()
}

/// Scores the trained model and, if one is stored, the current best.
#[derive(Debug, Default)]
pub struct ModelEvaluationStage;

impl ModelEvaluationStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn score(
        ctx: &StageContext,
        model_dir: PathBuf,
        tokenizer_dir: PathBuf,
        samples: &[DialogueSample],
    ) -> Result<RougeScores> {
        let config = ctx.config();
        let request = ScoreRequest {
            model_dir,
            tokenizer_dir,
            samples: samples.to_vec(),
            batch_size: config.evaluation.batch_size,
            max_input_length: config.transformation.max_input_length,
            generation: config.evaluation.generation.clone(),
        };
        ctx.backend().score(&request).await
    }

    /// Downloads the stored best model, returning its model and tokenizer
    /// directories, or `None` when nothing is stored under the model prefix.
    async fn fetch_stored_model(ctx: &StageContext) -> Result<Option<(PathBuf, PathBuf)>> {
        let storage = &ctx.config().storage;
        let bucket = ctx.model_bucket()?;
        if !bucket.is_prefix_present(&storage.model_prefix).await? {
            info!(bucket = %bucket.bucket(), prefix = %storage.model_prefix, "no stored model");
            return Ok(None);
        }

        let layout = ctx.layout();
        let model_dir = layout.downloaded_dir(&storage.model_prefix);
        let tokenizer_dir = layout.downloaded_dir(&storage.tokenizer_prefix);
        for (prefix, dest) in [
            (&storage.model_prefix, &model_dir),
            (&storage.tokenizer_prefix, &tokenizer_dir),
        ] {
            // Leftovers from an earlier invocation of this run must not mix in.
            if dest.exists() {
                tokio::fs::remove_dir_all(dest).await?;
            }
            bucket.download_prefix(prefix, dest).await?;
        }
        require_non_empty_dir(&model_dir)?;
        Ok(Some((model_dir, tokenizer_dir)))
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let config = ctx.config();
        let layout = ctx.layout();
        layout.ensure_stage_dir(StageId::Evaluation)?;

        let model_dir = layout.trained_model_dir();
        let tokenizer_dir = layout.trained_tokenizer_dir();
        require_non_empty_dir(&model_dir)?;
        require_non_empty_dir(&tokenizer_dir)?;

        let samples: Vec<DialogueSample> = read_split(
            &layout.transformed_dir(),
            EVALUATION_SPLIT,
            Some(config.evaluation.sample_count),
        )?
        .iter()
        .map(TokenizedRecord::sample)
        .collect();
        if samples.is_empty() {
            return Err(SummaflowError::Validation(format!(
                "no {EVALUATION_SPLIT} samples to evaluate"
            )));
        }

        let trained = Self::score(ctx, model_dir, tokenizer_dir, &samples).await?;
        info!(samples = samples.len(), score = trained.average(), "scored trained model");
        let mut rows = vec![MetricRow::new(TRAINED_MODEL, &trained)];

        let stored = match Self::fetch_stored_model(ctx).await? {
            Some((model_dir, tokenizer_dir)) => {
                let scores = Self::score(ctx, model_dir, tokenizer_dir, &samples).await?;
                info!(score = scores.average(), "scored stored model");
                rows.push(MetricRow::new(DOWNLOADED_MODEL, &scores));
                Some(scores.average())
            }
            None => None,
        };

        let accepted = decide_promotion(trained.average(), stored);
        info!(
            new_score = trained.average(),
            old_score = ?stored,
            accepted,
            "promotion decided"
        );

        let metrics_path = layout.metrics_file(&config.evaluation.metric_file_name);
        write_metrics(&metrics_path, &rows)?;
        let status_path = layout.model_status_file(&config.evaluation.status_file_name);
        ModelStatus::new(accepted).write(&status_path)?;

        Ok(
            StageOutput::ok_value("trained_model_accepted", serde_json::Value::Bool(accepted))
                .with_value("new_score", serde_json::json!(trained.average()))
                .with_value("old_score", serde_json::json!(stored))
                .with_artifact(StageArtifact::existing(ArtifactKind::Report, &metrics_path)?)
                .with_artifact(StageArtifact::existing(
                    ArtifactKind::StatusFlag,
                    &status_path,
                )?),
        )
    }
}

#[async_trait]
impl Stage for ModelEvaluationStage {
    fn id(&self) -> StageId {
        StageId::Evaluation
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.id(), self.run(ctx).await)
    }
}
