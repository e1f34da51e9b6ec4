//! Wiring of configuration, storage, backend and events into the operations
//! exposed by the CLI and the REST server.

use crate::backend::{CommandBackend, SummarizationBackend};
use crate::config::{ArtifactLayout, PipelineConfig};
use crate::core::StageId;
use crate::errors::{Result, SummaflowError};
use crate::events::{EventSink, LoggingEventSink};
use crate::pipeline::{PipelineBuilder, PipelineRunResult};
use crate::prediction::PredictionService;
use crate::stages::{stage_for, StageContext, StageRecord};
use crate::storage::StorageProvider;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Shared handles for running the pipeline and serving predictions.
#[derive(Clone)]
pub struct SummaflowApp {
    config: Arc<PipelineConfig>,
    storage: Arc<StorageProvider>,
    backend: Arc<dyn SummarizationBackend>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for SummaflowApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaflowApp")
            .field("artifacts_root", &self.config.artifacts_root)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl SummaflowApp {
    /// Creates an app from explicit parts.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        storage: Arc<StorageProvider>,
        backend: Arc<dyn SummarizationBackend>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            backend,
            sink: Arc::new(LoggingEventSink::info()),
        }
    }

    /// Creates an app with the configured storage and the command backend.
    #[must_use]
    pub fn from_config(config: PipelineConfig) -> Self {
        let storage = Arc::new(StorageProvider::new(config.storage.clone()));
        let backend = Arc::new(CommandBackend::new(config.backend.clone()));
        Self::new(config, storage, backend)
    }

    /// Replaces the event sink used by pipeline runs.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The storage provider.
    #[must_use]
    pub fn storage(&self) -> &Arc<StorageProvider> {
        &self.storage
    }

    fn context(&self, layout: ArtifactLayout) -> StageContext {
        StageContext::new(
            self.config.clone(),
            layout,
            self.storage.clone(),
            self.backend.clone(),
        )
    }

    /// A context for a new run stamped with the current time.
    #[must_use]
    pub fn start_run(&self) -> StageContext {
        self.context(ArtifactLayout::start_run(
            self.config.artifacts_root.clone(),
            Utc::now(),
        ))
    }

    /// A context for `run_id`, or for the latest run when none is given.
    ///
    /// Without any previous run, a new one is started.
    pub fn context_for(&self, run_id: Option<&str>) -> Result<StageContext> {
        let root = &self.config.artifacts_root;
        if let Some(run_id) = run_id {
            return Ok(self.context(ArtifactLayout::new(root.clone(), run_id)));
        }
        Ok(match ArtifactLayout::latest_run(root)? {
            Some(layout) => self.context(layout),
            None => self.start_run(),
        })
    }

    /// Runs all six stages in a fresh run directory.
    pub async fn train(&self) -> Result<PipelineRunResult> {
        let pipeline = PipelineBuilder::full()
            .with_event_sink(self.sink.clone())
            .build()?;
        let ctx = self.start_run();
        pipeline.run(&ctx).await.into_result()
    }

    /// Runs one stage against `run_id` or the latest run.
    pub async fn run_stage(&self, stage: StageId, run_id: Option<&str>) -> Result<StageRecord> {
        let ctx = if run_id.is_none() && stage == StageId::Ingestion {
            self.start_run()
        } else {
            self.context_for(run_id)?
        };
        info!(stage = %stage, run_id = %ctx.run_id(), ">>>>>> {} started <<<<<<", stage.label());

        let started_at = Utc::now();
        let output = stage_for(stage).execute(&ctx).await;
        let record = StageRecord::from_output(stage, started_at, &output);
        if record.is_failure() {
            return Err(SummaflowError::stage_failed(
                stage.to_string(),
                record.error.clone().unwrap_or_default(),
            ));
        }
        info!(stage = %stage, ">>>>>> {} completed <<<<<<", stage.label());
        Ok(record)
    }

    /// A prediction service sharing this app's storage and backend.
    #[must_use]
    pub fn prediction(&self) -> PredictionService {
        PredictionService::new(
            self.config.clone(),
            self.storage.clone(),
            self.backend.clone(),
        )
    }

    /// Summarizes `text` with the stored best model.
    pub async fn predict(&self, text: &str) -> Result<String> {
        self.prediction().predict(text).await
    }
}
