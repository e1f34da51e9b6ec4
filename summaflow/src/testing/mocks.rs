//! Mock backend for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::time::Duration;

use crate::backend::{ScoreRequest, SummarizationBackend, SummarizeRequest, TrainingJob};
use crate::core::RougeScores;
use crate::errors::{Result, SummaflowError};

/// File written into the model directory that carries the model's score.
pub const MOCK_SCORE_FILE: &str = "config.json";

/// A backend that fakes training, scoring and generation.
///
/// `train` writes a model directory whose `config.json` records the
/// configured score; `score` reads that value back, so every model scores
/// what it was trained with. This lets tests pit a fresh model against one
/// pushed by an earlier run.
#[derive(Debug)]
pub struct MockBackend {
    train_score: Mutex<f64>,
    summary: Mutex<String>,
    fail_training: Mutex<bool>,
    skip_outputs: Mutex<bool>,
    train_delay: Mutex<Option<Duration>>,
    train_calls: Mutex<usize>,
    score_calls: Mutex<usize>,
    summarize_requests: Mutex<Vec<SummarizeRequest>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Creates a mock whose trained models score 0.5.
    #[must_use]
    pub fn new() -> Self {
        Self {
            train_score: Mutex::new(0.5),
            summary: Mutex::new("mock summary".to_string()),
            fail_training: Mutex::new(false),
            skip_outputs: Mutex::new(false),
            train_delay: Mutex::new(None),
            train_calls: Mutex::new(0),
            score_calls: Mutex::new(0),
            summarize_requests: Mutex::new(Vec::new()),
        }
    }

    /// Sets the score given to models trained from now on.
    pub fn set_train_score(&self, score: f64) {
        *self.train_score.lock() = score;
    }

    /// Sets the summary returned by `summarize`.
    pub fn set_summary(&self, summary: impl Into<String>) {
        *self.summary.lock() = summary.into();
    }

    /// Makes `train` fail.
    pub fn set_fail_training(&self, fail: bool) {
        *self.fail_training.lock() = fail;
    }

    /// Makes `train` succeed without writing any artifacts.
    pub fn set_skip_outputs(&self, skip: bool) {
        *self.skip_outputs.lock() = skip;
    }

    /// Makes `train` sleep before producing its artifacts.
    pub fn set_train_delay(&self, delay: Duration) {
        *self.train_delay.lock() = Some(delay);
    }

    /// Number of `train` calls.
    #[must_use]
    pub fn train_calls(&self) -> usize {
        *self.train_calls.lock()
    }

    /// Number of `score` calls.
    #[must_use]
    pub fn score_calls(&self) -> usize {
        *self.score_calls.lock()
    }

    /// All `summarize` requests received.
    #[must_use]
    pub fn summarize_requests(&self) -> Vec<SummarizeRequest> {
        self.summarize_requests.lock().clone()
    }
}

#[async_trait]
impl SummarizationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn train(&self, job: &TrainingJob) -> Result<()> {
        *self.train_calls.lock() += 1;
        let delay = *self.train_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_training.lock() {
            return Err(SummaflowError::backend("mock", "training diverged"));
        }
        if *self.skip_outputs.lock() {
            return Ok(());
        }

        let score = *self.train_score.lock();
        tokio::fs::create_dir_all(&job.model_dir).await?;
        tokio::fs::create_dir_all(&job.tokenizer_dir).await?;
        tokio::fs::write(
            job.model_dir.join(MOCK_SCORE_FILE),
            serde_json::to_vec(&json!({"model_ckpt": job.model_ckpt, "mock_score": score}))?,
        )
        .await?;
        tokio::fs::write(job.model_dir.join("model.safetensors"), b"weights").await?;
        tokio::fs::write(job.tokenizer_dir.join("tokenizer.json"), b"{}").await?;
        tokio::fs::write(job.tokenizer_dir.join("special_tokens_map.json"), b"{}").await?;
        Ok(())
    }

    async fn score(&self, request: &ScoreRequest) -> Result<RougeScores> {
        *self.score_calls.lock() += 1;
        let path = request.model_dir.join(MOCK_SCORE_FILE);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| SummaflowError::missing_artifact(&path))?;
        let config: serde_json::Value = serde_json::from_slice(&bytes)?;
        let score = config
            .get("mock_score")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| SummaflowError::backend("mock", "model has no mock_score"))?;
        Ok(RougeScores::new(score, score, score, score))
    }

    async fn summarize(&self, request: &SummarizeRequest) -> Result<String> {
        self.summarize_requests.lock().push(request.clone());
        Ok(self.summary.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GenerationParams, TrainingArguments};
    use tempfile::TempDir;

    fn job(root: &std::path::Path) -> TrainingJob {
        TrainingJob {
            model_ckpt: "google/pegasus-cnn_dailymail".to_string(),
            dataset_dir: root.join("data"),
            output_dir: root.join("out"),
            model_dir: root.join("out").join("model"),
            tokenizer_dir: root.join("out").join("tokenizer"),
            args: TrainingArguments::default(),
        }
    }

    #[tokio::test]
    async fn test_trained_model_scores_configured_value() {
        let temp = TempDir::new().unwrap();
        let backend = MockBackend::new();
        backend.set_train_score(0.42);

        let job = job(temp.path());
        backend.train(&job).await.unwrap();

        let scores = backend
            .score(&ScoreRequest {
                model_dir: job.model_dir.clone(),
                tokenizer_dir: job.tokenizer_dir.clone(),
                samples: Vec::new(),
                batch_size: 2,
                max_input_length: 1024,
                generation: GenerationParams::default(),
            })
            .await
            .unwrap();

        assert!((scores.average() - 0.42).abs() < 1e-9);
        assert_eq!(backend.train_calls(), 1);
        assert_eq!(backend.score_calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_training() {
        let temp = TempDir::new().unwrap();
        let backend = MockBackend::new();
        backend.set_fail_training(true);

        assert!(backend.train(&job(temp.path())).await.is_err());
    }
}
