//! Summary generation from the stored best model.
//!
//! [`PredictionService`] keeps a local copy of the model and tokenizer under
//! `<artifacts_root>/prediction/<prefix>`. Before each request it refreshes
//! the copy: an empty cache downloads the whole prefix, otherwise every
//! cached file whose remote object was last modified outside the freshness
//! window is downloaded again.

use crate::backend::{SummarizationBackend, SummarizeRequest};
use crate::config::{ArtifactLayout, PipelineConfig};
use crate::errors::{Result, StorageError};
use crate::storage::{StorageAdapter, StorageProvider};
use crate::utils::{is_missing_or_empty, is_modified_within, list_files_recursive, Timestamp};
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What a cache refresh did for one prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Files downloaded because the cache was empty.
    pub bootstrapped: usize,
    /// Cached files downloaded again.
    pub refreshed: usize,
    /// Cached files left as they were.
    pub kept: usize,
}

/// Serves summaries with the stored best model.
pub struct PredictionService {
    config: Arc<PipelineConfig>,
    storage: Arc<StorageProvider>,
    backend: Arc<dyn SummarizationBackend>,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("cache_dir", &self.cache_dir())
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl PredictionService {
    /// Creates a service.
    #[must_use]
    pub fn new(
        config: Arc<PipelineConfig>,
        storage: Arc<StorageProvider>,
        backend: Arc<dyn SummarizationBackend>,
    ) -> Self {
        Self {
            config,
            storage,
            backend,
        }
    }

    /// Local cache root.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        ArtifactLayout::prediction_dir(&self.config.artifacts_root)
    }

    /// Local model directory.
    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        self.cache_dir().join(&self.config.storage.model_prefix)
    }

    /// Local tokenizer directory.
    #[must_use]
    pub fn tokenizer_dir(&self) -> PathBuf {
        self.cache_dir().join(&self.config.storage.tokenizer_prefix)
    }

    /// Summarizes `text`.
    pub async fn predict(&self, text: &str) -> Result<String> {
        self.predict_at(text, Utc::now()).await
    }

    /// Summarizes `text`, judging cache freshness against `now`.
    pub async fn predict_at(&self, text: &str, now: Timestamp) -> Result<String> {
        self.refresh_at(now).await?;

        let request = SummarizeRequest {
            model_dir: self.model_dir(),
            tokenizer_dir: self.tokenizer_dir(),
            text: text.to_string(),
            generation: self.config.prediction.generation.clone(),
        };
        let summary = self.backend.summarize(&request).await?;
        info!(input_chars = text.len(), summary_chars = summary.len(), "summary generated");
        Ok(summary)
    }

    /// Brings the model and tokenizer caches up to date.
    pub async fn refresh_at(&self, now: Timestamp) -> Result<(RefreshSummary, RefreshSummary)> {
        let bucket = self.storage.model_bucket()?;
        let max_age = self.config.prediction.max_age();
        let storage = &self.config.storage;

        let model = refresh_prefix(&bucket, &storage.model_prefix, &self.model_dir(), now, max_age)
            .await?;
        let tokenizer = refresh_prefix(
            &bucket,
            &storage.tokenizer_prefix,
            &self.tokenizer_dir(),
            now,
            max_age,
        )
        .await?;
        Ok((model, tokenizer))
    }
}

async fn refresh_prefix(
    bucket: &StorageAdapter,
    prefix: &str,
    local_dir: &Path,
    now: Timestamp,
    max_age: Duration,
) -> Result<RefreshSummary> {
    let mut summary = RefreshSummary::default();

    if is_missing_or_empty(local_dir) {
        summary.bootstrapped = bucket.download_prefix(prefix, local_dir).await?.len();
        if summary.bootstrapped == 0 {
            return Err(StorageError::NotFound {
                bucket: bucket.bucket().to_string(),
                key: prefix.to_string(),
            }
            .into());
        }
        info!(prefix = %prefix, files = summary.bootstrapped, "prediction cache populated");
        return Ok(summary);
    }

    for file in list_files_recursive(local_dir)? {
        let key = cache_key(prefix, local_dir, &file);
        let modified = bucket.last_modified(&key).await?;
        if is_modified_within(modified, now, max_age) {
            debug!(key = %key, %modified, "cached file is fresh");
            summary.kept += 1;
        } else {
            bucket.download_object(&key, &file).await?;
            info!(key = %key, %modified, "refreshed stale cached file");
            summary.refreshed += 1;
        }
    }
    Ok(summary)
}

fn cache_key(prefix: &str, local_dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(local_dir).unwrap_or(file);
    std::iter::once(prefix.trim_matches('/').to_string())
        .chain(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        )
        .collect::<Vec<_>>()
        .join("/")
}
