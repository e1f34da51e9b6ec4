//! Sequential pipeline execution with first-failure gating.

use crate::core::StageId;
use crate::errors::{Result, SummaflowError};
use crate::events::{
    EventSink, PIPELINE_COMPLETED, PIPELINE_FAILED, PIPELINE_STARTED, STAGE_COMPLETED,
    STAGE_FAILED, STAGE_STARTED,
};
use crate::stages::{Stage, StageContext, StageRecord};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunResult {
    /// Unique id of this execution, carried by every event.
    pub pipeline_run_id: Uuid,
    /// Artifact run id the stages wrote under.
    pub run_id: String,
    /// One record per stage that ran, in order.
    pub records: Vec<StageRecord>,
    /// The stage that stopped the run, if any.
    pub failed_stage: Option<StageId>,
}

impl PipelineRunResult {
    /// Returns true if every stage that ran succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_stage.is_none()
    }

    /// Record of the failed stage.
    #[must_use]
    pub fn failure(&self) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.is_failure())
    }

    /// Record of a stage, if it ran.
    #[must_use]
    pub fn record(&self, stage: StageId) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.stage == stage)
    }

    /// Converts a failed run into [`SummaflowError::StageFailed`].
    pub fn into_result(self) -> Result<Self> {
        match self.failure() {
            Some(record) => Err(SummaflowError::stage_failed(
                record.stage.to_string(),
                record.error.clone().unwrap_or_default(),
            )),
            None => Ok(self),
        }
    }
}

/// Runs stages strictly in order and stops at the first failure.
pub struct TrainingPipeline {
    stages: Vec<Arc<dyn Stage>>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for TrainingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingPipeline")
            .field("stages", &self.stage_ids())
            .finish_non_exhaustive()
    }
}

impl TrainingPipeline {
    pub(crate) fn new(stages: Vec<Arc<dyn Stage>>, sink: Arc<dyn EventSink>) -> Self {
        Self { stages, sink }
    }

    /// Stage ids in execution order.
    #[must_use]
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|s| s.id()).collect()
    }

    /// Executes the pipeline against one run's context.
    pub async fn run(&self, ctx: &StageContext) -> PipelineRunResult {
        let pipeline_run_id = Uuid::new_v4();
        let run_id = ctx.run_id().to_string();
        let mut records = Vec::with_capacity(self.stages.len());
        let mut failed_stage = None;

        info!(pipeline_run_id = %pipeline_run_id, run_id = %run_id, "training pipeline started");
        self.sink
            .emit(
                PIPELINE_STARTED,
                Some(json!({
                    "pipeline_run_id": pipeline_run_id,
                    "run_id": run_id,
                    "stages": self.stage_ids(),
                })),
            )
            .await;

        for stage in &self.stages {
            let id = stage.id();
            info!(stage = %id, ">>>>>> {} started <<<<<<", id.label());
            self.sink
                .emit(
                    STAGE_STARTED,
                    Some(json!({"pipeline_run_id": pipeline_run_id, "stage": id})),
                )
                .await;

            let started_at = Utc::now();
            let output = stage.execute(ctx).await;
            let record = StageRecord::from_output(id, started_at, &output);

            if record.is_failure() {
                self.sink
                    .emit(
                        STAGE_FAILED,
                        Some(json!({
                            "pipeline_run_id": pipeline_run_id,
                            "stage": id,
                            "error": record.error,
                        })),
                    )
                    .await;
                records.push(record);
                failed_stage = Some(id);
                break;
            }

            info!(
                stage = %id,
                duration_ms = record.duration_ms(),
                ">>>>>> {} completed <<<<<<",
                id.label()
            );
            self.sink
                .emit(
                    STAGE_COMPLETED,
                    Some(json!({
                        "pipeline_run_id": pipeline_run_id,
                        "stage": id,
                        "status": record.status,
                        "duration_ms": record.duration_ms(),
                    })),
                )
                .await;
            records.push(record);
        }

        match failed_stage {
            Some(stage) => {
                self.sink
                    .emit(
                        PIPELINE_FAILED,
                        Some(json!({
                            "pipeline_run_id": pipeline_run_id,
                            "run_id": run_id,
                            "failed_stage": stage,
                        })),
                    )
                    .await;
            }
            None => {
                info!(pipeline_run_id = %pipeline_run_id, "training pipeline completed");
                self.sink
                    .emit(
                        PIPELINE_COMPLETED,
                        Some(json!({"pipeline_run_id": pipeline_run_id, "run_id": run_id})),
                    )
                    .await;
            }
        }

        PipelineRunResult {
            pipeline_run_id,
            run_id,
            records,
            failed_stage,
        }
    }
}
