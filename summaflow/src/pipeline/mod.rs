//! Pipeline building and execution.
//!
//! This module provides:
//! - A builder that validates stage order
//! - A sequential runner that stops at the first failed stage

mod builder;
mod integration_tests;
mod runner;

pub use builder::PipelineBuilder;
pub use runner::{PipelineRunResult, TrainingPipeline};
