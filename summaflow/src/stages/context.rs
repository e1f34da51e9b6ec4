//! Execution context handed to every stage.

use crate::backend::SummarizationBackend;
use crate::config::{ArtifactLayout, PipelineConfig};
use crate::storage::{StorageAdapter, StorageProvider, StorageResult};
use std::fmt;
use std::sync::Arc;

/// Everything a stage needs: configuration, the run's artifact layout,
/// object storage and the ML backend.
#[derive(Clone)]
pub struct StageContext {
    config: Arc<PipelineConfig>,
    layout: ArtifactLayout,
    storage: Arc<StorageProvider>,
    backend: Arc<dyn SummarizationBackend>,
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("run_id", &self.layout.run_id())
            .field("root", &self.layout.root())
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl StageContext {
    /// Creates a context.
    #[must_use]
    pub fn new(
        config: Arc<PipelineConfig>,
        layout: ArtifactLayout,
        storage: Arc<StorageProvider>,
        backend: Arc<dyn SummarizationBackend>,
    ) -> Self {
        Self {
            config,
            layout,
            storage,
            backend,
        }
    }

    /// The pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Paths for this run.
    #[must_use]
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        self.layout.run_id()
    }

    /// Bucket handles.
    #[must_use]
    pub fn storage(&self) -> &StorageProvider {
        &self.storage
    }

    /// The bucket holding the current best model.
    pub fn model_bucket(&self) -> StorageResult<StorageAdapter> {
        self.storage.model_bucket()
    }

    /// The ML backend.
    #[must_use]
    pub fn backend(&self) -> &dyn SummarizationBackend {
        self.backend.as_ref()
    }
}
