//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds one section per stage plus the shared storage,
//! backend and server settings. It is read from TOML; every field has a
//! default so an empty file (or no file) yields a usable configuration.

mod layout;

pub use layout::{ArtifactLayout, PREDICTION_DIR};

use crate::backend::{GenerationParams, TrainingArguments};
use crate::errors::{Result, SummaflowError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`PipelineConfig::artifacts_root`].
pub const ENV_ARTIFACTS_ROOT: &str = "SUMMAFLOW_ARTIFACTS_ROOT";
/// Environment variable overriding [`StorageConfig::model_bucket`].
pub const ENV_MODEL_BUCKET: &str = "SUMMAFLOW_MODEL_BUCKET";
/// Environment variable overriding [`IngestionConfig::source_url`].
pub const ENV_DATA_URL: &str = "SUMMAFLOW_DATA_URL";
/// Environment variable overriding [`ServerConfig::address`].
pub const ENV_SERVER_ADDR: &str = "SUMMAFLOW_SERVER_ADDR";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory for run artifacts and the prediction cache.
    #[serde(default = "default_artifacts_root")]
    pub artifacts_root: PathBuf,
    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Ingestion stage settings.
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Validation stage settings.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Transformation stage settings.
    #[serde(default)]
    pub transformation: TransformationConfig,
    /// Training stage settings.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Evaluation stage settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Pusher stage settings.
    #[serde(default)]
    pub pusher: PusherConfig,
    /// Prediction service settings.
    #[serde(default)]
    pub prediction: PredictionConfig,
    /// REST server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// External ML backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_artifacts_root() -> PathBuf {
    PathBuf::from("artifacts")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifacts_root: default_artifacts_root(),
            storage: StorageConfig::default(),
            ingestion: IngestionConfig::default(),
            validation: ValidationConfig::default(),
            transformation: TransformationConfig::default(),
            training: TrainingConfig::default(),
            evaluation: EvaluationConfig::default(),
            pusher: PusherConfig::default(),
            prediction: PredictionConfig::default(),
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SummaflowError::Config(e.to_string()))
    }

    /// Loads the configuration from an optional TOML file and applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    SummaflowError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::new(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides looked up by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_ARTIFACTS_ROOT) {
            self.artifacts_root = PathBuf::from(root);
        }
        if let Some(bucket) = lookup(ENV_MODEL_BUCKET) {
            self.storage.model_bucket = bucket;
        }
        if let Some(url) = lookup(ENV_DATA_URL) {
            self.ingestion.source_url = Some(url);
        }
        if let Some(addr) = lookup(ENV_SERVER_ADDR) {
            self.server.address = addr.parse().map_err(|e| {
                SummaflowError::Config(format!("invalid {ENV_SERVER_ADDR} '{addr}': {e}"))
            })?;
        }
        Ok(())
    }

    /// Sets the artifacts root.
    #[must_use]
    pub fn with_artifacts_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifacts_root = root.into();
        self
    }

    /// Sets the storage section.
    #[must_use]
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the ingestion section.
    #[must_use]
    pub fn with_ingestion(mut self, ingestion: IngestionConfig) -> Self {
        self.ingestion = ingestion;
        self
    }

    /// Sets the transformation section.
    #[must_use]
    pub fn with_transformation(mut self, transformation: TransformationConfig) -> Self {
        self.transformation = transformation;
        self
    }
}

/// Which object store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Amazon S3 (or compatible), credentials from the environment.
    #[default]
    S3,
    /// A directory per bucket under [`StorageConfig::local_root`].
    Local,
    /// Process-local in-memory buckets.
    Memory,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store implementation.
    #[serde(default)]
    pub kind: StorageKind,
    /// Root directory for the `local` store.
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    /// AWS region; falls back to the environment.
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bucket holding the current best model.
    #[serde(default = "default_model_bucket")]
    pub model_bucket: String,
    /// Key prefix for model files.
    #[serde(default = "default_model_prefix")]
    pub model_prefix: String,
    /// Key prefix for tokenizer files.
    #[serde(default = "default_tokenizer_prefix")]
    pub tokenizer_prefix: String,
}

fn default_local_root() -> PathBuf {
    PathBuf::from("buckets")
}

fn default_model_bucket() -> String {
    "summarizer-models".to_string()
}

fn default_model_prefix() -> String {
    "model".to_string()
}

fn default_tokenizer_prefix() -> String {
    "tokenizer".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            local_root: default_local_root(),
            region: None,
            endpoint: None,
            model_bucket: default_model_bucket(),
            model_prefix: default_model_prefix(),
            tokenizer_prefix: default_tokenizer_prefix(),
        }
    }
}

impl StorageConfig {
    /// Creates a storage configuration of the given kind.
    #[must_use]
    pub fn new(kind: StorageKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Sets the model bucket.
    #[must_use]
    pub fn with_model_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.model_bucket = bucket.into();
        self
    }

    /// Sets the local store root.
    #[must_use]
    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = root.into();
        self
    }
}

/// Ingestion stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// HTTP(S) URL of the dataset archive.
    #[serde(default)]
    pub source_url: Option<String>,
    /// Bucket to fetch the archive from when no URL is set.
    #[serde(default)]
    pub source_bucket: Option<String>,
    /// Object key of the archive in `source_bucket`.
    #[serde(default = "default_archive_name")]
    pub source_key: String,
    /// Bucket to mirror a URL download into.
    #[serde(default)]
    pub mirror_bucket: Option<String>,
    /// Local file name of the archive.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    /// Directory inside the archive holding the CSV files.
    #[serde(default)]
    pub dataset_subdir: Option<String>,
    /// Download timeout in seconds.
    #[serde(default = "default_download_timeout")]
    pub timeout_seconds: u64,
}

fn default_archive_name() -> String {
    "summarizer-data.zip".to_string()
}

fn default_download_timeout() -> u64 {
    600
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            source_bucket: None,
            source_key: default_archive_name(),
            mirror_bucket: None,
            archive_name: default_archive_name(),
            dataset_subdir: None,
            timeout_seconds: default_download_timeout(),
        }
    }
}

impl IngestionConfig {
    /// Fetch the archive from a URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            source_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Fetch the archive from a bucket.
    #[must_use]
    pub fn from_bucket(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source_bucket: Some(bucket.into()),
            source_key: key.into(),
            ..Self::default()
        }
    }

    /// Sets the local archive file name.
    #[must_use]
    pub fn with_archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = name.into();
        self
    }

    /// Sets the mirror bucket.
    #[must_use]
    pub fn with_mirror_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.mirror_bucket = Some(bucket.into());
        self
    }

    /// Sets the directory inside the archive holding the CSV files.
    #[must_use]
    pub fn with_dataset_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.dataset_subdir = Some(subdir.into());
        self
    }
}

/// Validation stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Exact set of file names expected after extraction.
    #[serde(default = "default_required_files")]
    pub required_files: Vec<String>,
    /// Name of the status flag file.
    #[serde(default = "default_validation_status_file")]
    pub status_file_name: String,
}

fn default_required_files() -> Vec<String> {
    vec![
        "samsum-train.csv".to_string(),
        "samsum-test.csv".to_string(),
        "samsum-validation.csv".to_string(),
    ]
}

fn default_validation_status_file() -> String {
    "status.txt".to_string()
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            required_files: default_required_files(),
            status_file_name: default_validation_status_file(),
        }
    }
}

/// Transformation stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationConfig {
    /// Path to a `tokenizer.json` file.
    #[serde(default = "default_tokenizer_file")]
    pub tokenizer_file: PathBuf,
    /// Maximum number of input tokens.
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    /// Maximum number of label tokens.
    #[serde(default = "default_max_target_length")]
    pub max_target_length: usize,
    /// Text prepended to every dialogue.
    #[serde(default = "default_input_prefix")]
    pub input_prefix: String,
    /// Dataset splits to transform.
    #[serde(default = "default_splits")]
    pub splits: Vec<String>,
    /// CSV file name pattern; `{split}` is replaced by the split name.
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
}

fn default_tokenizer_file() -> PathBuf {
    PathBuf::from("pretrained/tokenizer.json")
}

fn default_max_input_length() -> usize {
    1024
}

fn default_max_target_length() -> usize {
    128
}

fn default_input_prefix() -> String {
    "Summarize: ".to_string()
}

fn default_splits() -> Vec<String> {
    vec![
        "train".to_string(),
        "validation".to_string(),
        "test".to_string(),
    ]
}

fn default_file_pattern() -> String {
    "samsum-{split}.csv".to_string()
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            tokenizer_file: default_tokenizer_file(),
            max_input_length: default_max_input_length(),
            max_target_length: default_max_target_length(),
            input_prefix: default_input_prefix(),
            splits: default_splits(),
            file_pattern: default_file_pattern(),
        }
    }
}

impl TransformationConfig {
    /// CSV file name for a split.
    #[must_use]
    pub fn split_file_name(&self, split: &str) -> String {
        self.file_pattern.replace("{split}", split)
    }

    /// Sets the tokenizer file.
    #[must_use]
    pub fn with_tokenizer_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tokenizer_file = path.into();
        self
    }

    /// Sets the maximum input and target lengths.
    #[must_use]
    pub fn with_max_lengths(mut self, input: usize, target: usize) -> Self {
        self.max_input_length = input;
        self.max_target_length = target;
        self
    }
}

/// Training stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Pretrained checkpoint to fine-tune.
    #[serde(default = "default_model_ckpt")]
    pub model_ckpt: String,
    /// Trainer hyperparameters.
    #[serde(default)]
    pub args: TrainingArguments,
}

fn default_model_ckpt() -> String {
    "google/pegasus-cnn_dailymail".to_string()
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_ckpt: default_model_ckpt(),
            args: TrainingArguments::default(),
        }
    }
}

/// Evaluation stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Number of leading test samples to score.
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    /// Samples per generation batch.
    #[serde(default = "default_eval_batch_size")]
    pub batch_size: usize,
    /// Metrics report file name.
    #[serde(default = "default_metric_file")]
    pub metric_file_name: String,
    /// Promotion decision file name.
    #[serde(default = "default_model_status_file")]
    pub status_file_name: String,
    /// Decoding parameters used while scoring.
    #[serde(default)]
    pub generation: GenerationParams,
}

fn default_sample_count() -> usize {
    10
}

fn default_eval_batch_size() -> usize {
    2
}

fn default_metric_file() -> String {
    "metrics.csv".to_string()
}

fn default_model_status_file() -> String {
    "model_status.json".to_string()
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            batch_size: default_eval_batch_size(),
            metric_file_name: default_metric_file(),
            status_file_name: default_model_status_file(),
            generation: GenerationParams::default(),
        }
    }
}

/// Pusher stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PusherConfig {
    /// Skip objects whose stored ETag matches the local MD5.
    #[serde(default = "default_skip_unchanged")]
    pub skip_unchanged: bool,
}

fn default_skip_unchanged() -> bool {
    true
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            skip_unchanged: default_skip_unchanged(),
        }
    }
}

/// Prediction service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Cached files older than this are downloaded again.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
    /// Decoding parameters.
    #[serde(default)]
    pub generation: GenerationParams,
}

fn default_max_age_hours() -> i64 {
    24
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            generation: GenerationParams::default(),
        }
    }
}

impl PredictionConfig {
    /// Freshness window as a duration.
    #[must_use]
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_age_hours)
    }
}

/// REST server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_server_address")]
    pub address: SocketAddr,
}

fn default_server_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
        }
    }
}

/// External ML backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Program to run for each backend request.
    #[serde(default = "default_backend_program")]
    pub program: String,
    /// Arguments passed before the request verb.
    #[serde(default = "default_backend_args")]
    pub args: Vec<String>,
    /// Working directory of the backend process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_backend_program() -> String {
    "python3".to_string()
}

fn default_backend_args() -> Vec<String> {
    vec!["-m".to_string(), "summaflow_backend".to_string()]
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: default_backend_program(),
            args: default_backend_args(),
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();

        assert_eq!(config.artifacts_root, PathBuf::from("artifacts"));
        assert_eq!(config.storage.model_prefix, "model");
        assert_eq!(config.storage.tokenizer_prefix, "tokenizer");
        assert_eq!(config.transformation.max_input_length, 1024);
        assert_eq!(config.transformation.max_target_length, 128);
        assert_eq!(config.transformation.input_prefix, "Summarize: ");
        assert_eq!(config.evaluation.sample_count, 10);
        assert_eq!(config.evaluation.batch_size, 2);
        assert_eq!(config.training.args.gradient_accumulation_steps, 16);
        assert_eq!(config.prediction.generation.num_beams, 8);
        assert_eq!(
            config.validation.required_files,
            vec!["samsum-train.csv", "samsum-test.csv", "samsum-validation.csv"]
        );
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            artifacts_root = "/srv/artifacts"

            [storage]
            kind = "local"
            model_bucket = "best-models"

            [ingestion]
            source_url = "https://example.com/data.zip"

            [training.args]
            num_train_epochs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.artifacts_root, PathBuf::from("/srv/artifacts"));
        assert_eq!(config.storage.kind, StorageKind::Local);
        assert_eq!(config.storage.model_bucket, "best-models");
        assert_eq!(config.storage.model_prefix, "model");
        assert_eq!(
            config.ingestion.source_url.as_deref(),
            Some("https://example.com/data.zip")
        );
        assert_eq!(config.training.args.num_train_epochs, 3);
        assert_eq!(config.training.args.warmup_steps, 500);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = PipelineConfig::from_toml_str("artifacts_root = [").unwrap_err();
        assert!(matches!(err, SummaflowError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::new();
        let vars: HashMap<&str, &str> = [
            (ENV_ARTIFACTS_ROOT, "/tmp/runs"),
            (ENV_MODEL_BUCKET, "override-bucket"),
            (ENV_DATA_URL, "https://example.com/samsum.zip"),
            (ENV_SERVER_ADDR, "127.0.0.1:9000"),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides(|key| vars.get(key).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.artifacts_root, PathBuf::from("/tmp/runs"));
        assert_eq!(config.storage.model_bucket, "override-bucket");
        assert_eq!(
            config.ingestion.source_url.as_deref(),
            Some("https://example.com/samsum.zip")
        );
        assert_eq!(config.server.address.port(), 9000);
    }

    #[test]
    fn test_invalid_server_addr_override() {
        let mut config = PipelineConfig::new();
        let result = config.apply_overrides(|key| {
            (key == ENV_SERVER_ADDR).then(|| "not-an-address".to_string())
        });
        assert!(matches!(result, Err(SummaflowError::Config(_))));
    }

    #[test]
    fn test_split_file_name() {
        let config = TransformationConfig::default();
        assert_eq!(config.split_file_name("validation"), "samsum-validation.csv");
    }
}
