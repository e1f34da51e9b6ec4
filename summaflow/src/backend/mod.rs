//! The seam between the pipeline and the ML framework.
//!
//! Fine-tuning, generation and ROUGE computation are owned by an external
//! framework. Stages talk to it only through [`SummarizationBackend`]; the
//! production implementation is [`CommandBackend`], tests use
//! [`crate::testing::MockBackend`].

mod command;

pub use command::CommandBackend;

use crate::core::RougeScores;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One dialogue/summary pair from the SAMSum CSV files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueSample {
    /// Sample id.
    pub id: String,
    /// The conversation.
    pub dialogue: String,
    /// The reference summary.
    pub summary: String,
}

/// Hyperparameters forwarded to the seq2seq trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArguments {
    /// Number of epochs.
    #[serde(default = "default_epochs")]
    pub num_train_epochs: u32,
    /// Learning-rate warmup steps.
    #[serde(default = "default_warmup_steps")]
    pub warmup_steps: u32,
    /// Per-device batch size, used for both training and evaluation.
    #[serde(default = "default_batch_size")]
    pub per_device_train_batch_size: u32,
    /// Weight decay.
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
    /// Steps between log lines.
    #[serde(default = "default_logging_steps")]
    pub logging_steps: u32,
    /// When to evaluate (`"steps"` or `"epoch"`).
    #[serde(default = "default_evaluation_strategy")]
    pub evaluation_strategy: String,
    /// Steps between evaluations.
    #[serde(default = "default_eval_steps")]
    pub eval_steps: u32,
    /// Steps between checkpoints.
    #[serde(default = "default_save_steps")]
    pub save_steps: u64,
    /// Gradient accumulation steps.
    #[serde(default = "default_gradient_accumulation_steps")]
    pub gradient_accumulation_steps: u32,
}

fn default_epochs() -> u32 {
    1
}

fn default_warmup_steps() -> u32 {
    500
}

fn default_batch_size() -> u32 {
    1
}

fn default_weight_decay() -> f64 {
    0.01
}

fn default_logging_steps() -> u32 {
    10
}

fn default_evaluation_strategy() -> String {
    "steps".to_string()
}

fn default_eval_steps() -> u32 {
    500
}

fn default_save_steps() -> u64 {
    1_000_000
}

fn default_gradient_accumulation_steps() -> u32 {
    16
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            num_train_epochs: default_epochs(),
            warmup_steps: default_warmup_steps(),
            per_device_train_batch_size: default_batch_size(),
            weight_decay: default_weight_decay(),
            logging_steps: default_logging_steps(),
            evaluation_strategy: default_evaluation_strategy(),
            eval_steps: default_eval_steps(),
            save_steps: default_save_steps(),
            gradient_accumulation_steps: default_gradient_accumulation_steps(),
        }
    }
}

/// Decoding parameters for summary generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Beam width.
    #[serde(default = "default_num_beams")]
    pub num_beams: u32,
    /// Exponential length penalty; below 1.0 favors shorter output.
    #[serde(default = "default_length_penalty")]
    pub length_penalty: f64,
    /// Maximum generated tokens.
    #[serde(default = "default_max_length")]
    pub max_length: u32,
}

fn default_num_beams() -> u32 {
    8
}

fn default_length_penalty() -> f64 {
    0.8
}

fn default_max_length() -> u32 {
    128
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            num_beams: default_num_beams(),
            length_penalty: default_length_penalty(),
            max_length: default_max_length(),
        }
    }
}

/// A fine-tuning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJob {
    /// Pretrained checkpoint to start from.
    pub model_ckpt: String,
    /// Directory with the tokenized splits.
    pub dataset_dir: PathBuf,
    /// Trainer working directory.
    pub output_dir: PathBuf,
    /// Where the fine-tuned model must be saved.
    pub model_dir: PathBuf,
    /// Where the tokenizer must be saved.
    pub tokenizer_dir: PathBuf,
    /// Trainer hyperparameters.
    pub args: TrainingArguments,
}

/// A request to score a model against reference summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    /// Model directory.
    pub model_dir: PathBuf,
    /// Tokenizer directory.
    pub tokenizer_dir: PathBuf,
    /// Samples to summarize and compare.
    pub samples: Vec<DialogueSample>,
    /// Samples per generation batch.
    pub batch_size: usize,
    /// Input truncation length.
    pub max_input_length: usize,
    /// Decoding parameters.
    pub generation: GenerationParams,
}

/// A request to summarize one text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeRequest {
    /// Model directory.
    pub model_dir: PathBuf,
    /// Tokenizer directory.
    pub tokenizer_dir: PathBuf,
    /// Input text.
    pub text: String,
    /// Decoding parameters.
    pub generation: GenerationParams,
}

/// Operations delegated to the ML framework.
#[async_trait]
pub trait SummarizationBackend: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Fine-tunes a model and saves it to `job.model_dir` and `job.tokenizer_dir`.
    async fn train(&self, job: &TrainingJob) -> Result<()>;

    /// Computes ROUGE F-measures of the model's summaries.
    async fn score(&self, request: &ScoreRequest) -> Result<RougeScores>;

    /// Generates a summary.
    async fn summarize(&self, request: &SummarizeRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_arguments_defaults() {
        let args = TrainingArguments::default();
        assert_eq!(args.num_train_epochs, 1);
        assert_eq!(args.warmup_steps, 500);
        assert_eq!(args.per_device_train_batch_size, 1);
        assert!((args.weight_decay - 0.01).abs() < f64::EPSILON);
        assert_eq!(args.logging_steps, 10);
        assert_eq!(args.evaluation_strategy, "steps");
        assert_eq!(args.eval_steps, 500);
        assert_eq!(args.save_steps, 1_000_000);
        assert_eq!(args.gradient_accumulation_steps, 16);
    }

    #[test]
    fn test_generation_params_serialize() {
        let value = serde_json::to_value(GenerationParams::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"num_beams": 8, "length_penalty": 0.8, "max_length": 128})
        );
    }
}
