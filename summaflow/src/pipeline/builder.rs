//! Pipeline builder with validation.

use super::TrainingPipeline;
use crate::errors::{Result, SummaflowError};
use crate::events::{EventSink, LoggingEventSink};
use crate::stages::{default_stages, Stage};
use std::sync::Arc;

/// Builder for creating validated training pipelines.
///
/// Stages must be added in pipeline order, each at most once. Gaps are
/// allowed, so a pipeline can stop after evaluation.
pub struct PipelineBuilder {
    /// The stages, in insertion order.
    stages: Vec<Arc<dyn Stage>>,
    /// Where lifecycle events go.
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Creates an empty builder that logs events.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            sink: Arc::new(LoggingEventSink::info()),
        }
    }

    /// A builder holding all six stages.
    #[must_use]
    pub fn full() -> Self {
        Self {
            stages: default_stages(),
            ..Self::new()
        }
    }

    /// Adds a stage.
    ///
    /// # Errors
    ///
    /// Returns [`SummaflowError::Pipeline`] if the stage was already added or
    /// would run before a stage it depends on.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Result<Self> {
        let id = stage.id();
        if self.stages.iter().any(|s| s.id() == id) {
            return Err(SummaflowError::Pipeline(format!(
                "Stage '{id}' is already in the pipeline"
            )));
        }
        if let Some(last) = self.stages.last() {
            let last_id = last.id();
            if last_id.index() > id.index() {
                return Err(SummaflowError::Pipeline(format!(
                    "Stage '{id}' cannot run after '{last_id}'"
                )));
            }
        }
        self.stages.push(stage);
        Ok(self)
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder has no stages.
    pub fn build(self) -> Result<TrainingPipeline> {
        if self.stages.is_empty() {
            return Err(SummaflowError::Pipeline("Pipeline has no stages".to_string()));
        }
        Ok(TrainingPipeline::new(self.stages, self.sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageId;
    use crate::stages::stage_for;

    #[test]
    fn test_empty_pipeline_is_rejected() {
        let err = PipelineBuilder::new().build().unwrap_err();
        assert_eq!(err.to_string(), "Pipeline error: Pipeline has no stages");
    }

    #[test]
    fn test_duplicate_stage_is_rejected() {
        let err = PipelineBuilder::new()
            .stage(stage_for(StageId::Ingestion))
            .unwrap()
            .stage(stage_for(StageId::Ingestion))
            .unwrap_err();
        assert!(err.to_string().contains("already in the pipeline"));
    }

    #[test]
    fn test_out_of_order_stage_is_rejected() {
        let err = PipelineBuilder::new()
            .stage(stage_for(StageId::Training))
            .unwrap()
            .stage(stage_for(StageId::Validation))
            .unwrap_err();
        assert!(err.to_string().contains("cannot run after 'model_trainer'"));
    }

    #[test]
    fn test_partial_pipeline_builds() {
        let pipeline = PipelineBuilder::new()
            .stage(stage_for(StageId::Training))
            .unwrap()
            .stage(stage_for(StageId::Evaluation))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(pipeline.stage_ids(), vec![StageId::Training, StageId::Evaluation]);
    }

    #[test]
    fn test_full_builder_has_six_stages() {
        assert_eq!(PipelineBuilder::full().stage_count(), 6);
    }
}
