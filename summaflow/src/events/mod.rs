//! Pipeline lifecycle events.
//!
//! The runner reports progress through an [`EventSink`]. Event names are
//! dotted (`pipeline.started`, `stage.failed`, ...) and carry a JSON payload
//! with the run id, stage name and, on failure, the error message.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A pipeline run began.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// Every stage succeeded.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A stage failed and the run stopped.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// A stage began.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage finished with an ok or skip status.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage finished with a fail status.
pub const STAGE_FAILED: &str = "stage.failed";
