//! The six training pipeline stages.
//!
//! Every stage implements [`Stage`]. Stages do their work in a fallible
//! `run` method and [`Stage::execute`] converts any error into a failed
//! [`StageOutput`] carrying the original message, after logging it.

mod context;
pub mod evaluation;
pub mod ingestion;
mod result;
pub mod pusher;
pub mod training;
pub mod transformation;
pub mod validation;

pub use context::StageContext;
pub use evaluation::ModelEvaluationStage;
pub use ingestion::DataIngestionStage;
pub use pusher::ModelPusherStage;
pub use result::StageRecord;
pub use training::ModelTrainingStage;
pub use transformation::DataTransformationStage;
pub use validation::DataValidationStage;

use crate::core::{StageId, StageOutput};
use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::error;

/// A unit of work in the training pipeline.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Which pipeline step this stage implements.
    fn id(&self) -> StageId;

    /// Returns the name of the stage.
    fn name(&self) -> &str {
        self.id().dir_name()
    }

    /// Executes the stage.
    ///
    /// Implementations never return an error; failures are reported through
    /// the output status.
    async fn execute(&self, ctx: &StageContext) -> StageOutput;
}

/// Converts a stage's fallible result into its output, logging failures.
pub(crate) fn finish(stage: StageId, result: Result<StageOutput>) -> StageOutput {
    match result {
        Ok(output) => output,
        Err(e) => {
            error!(stage = %stage, error = %e, "{} failed", stage.label());
            StageOutput::fail(e.to_string())
        }
    }
}

/// Returns the stage implementing `id`.
#[must_use]
pub fn stage_for(id: StageId) -> Arc<dyn Stage> {
    match id {
        StageId::Ingestion => Arc::new(DataIngestionStage::new()),
        StageId::Validation => Arc::new(DataValidationStage::new()),
        StageId::Transformation => Arc::new(DataTransformationStage::new()),
        StageId::Training => Arc::new(ModelTrainingStage::new()),
        StageId::Evaluation => Arc::new(ModelEvaluationStage::new()),
        StageId::Pusher => Arc::new(ModelPusherStage::new()),
    }
}

/// All stages in execution order.
#[must_use]
pub fn default_stages() -> Vec<Arc<dyn Stage>> {
    StageId::ALL.iter().map(|id| stage_for(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SummaflowError;

    #[test]
    fn test_finish_keeps_error_message() {
        let output = finish(
            StageId::Training,
            Err(SummaflowError::backend("command", "exit status 1")),
        );
        assert!(output.is_failure());
        assert_eq!(
            output.error.as_deref(),
            Some("Backend 'command' failed: exit status 1")
        );
    }

    #[test]
    fn test_default_stages_in_order() {
        let names: Vec<String> = default_stages().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "data_ingestion",
                "data_validation",
                "data_transformation",
                "model_trainer",
                "model_evaluation",
                "model_pusher",
            ]
        );
    }
}
