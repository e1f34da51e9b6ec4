//! # Summaflow
//!
//! A staged training, promotion and serving pipeline for a dialogue
//! summarization model.
//!
//! Summaflow provides:
//!
//! - **Six gated stages**: ingestion, validation, transformation, training,
//!   evaluation and pushing, each persisting its artifacts under a run directory
//! - **Model promotion**: a new model replaces the stored best only when it
//!   scores at least as well
//! - **Object storage**: S3, local-directory and in-memory buckets through one adapter
//! - **Prediction**: a cached copy of the stored best model, refreshed when stale
//! - **Event-driven observability**: lifecycle events for every run and stage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use summaflow::prelude::*;
//!
//! let app = SummaflowApp::from_config(PipelineConfig::load(None)?);
//! let result = app.train().await?;
//! let summary = app.predict("Amanda: I baked cookies. Do you want some?").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod app;
pub mod backend;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod prediction;
pub mod stages;
pub mod storage;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::app::SummaflowApp;
    pub use crate::backend::{CommandBackend, GenerationParams, SummarizationBackend};
    pub use crate::config::{ArtifactLayout, PipelineConfig, StorageConfig, StorageKind};
    pub use crate::core::{ModelStatus, RougeScores, StageId, StageOutput, StageStatus};
    pub use crate::errors::{Result, StorageError, SummaflowError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{PipelineBuilder, PipelineRunResult, TrainingPipeline};
    pub use crate::prediction::PredictionService;
    pub use crate::stages::{Stage, StageContext, StageRecord};
    pub use crate::storage::{StorageAdapter, StorageProvider};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
