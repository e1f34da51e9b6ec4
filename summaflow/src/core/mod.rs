//! Core domain model types for summaflow.
//!
//! This module contains the fundamental types shared by every stage:
//! - Stage identifiers and status
//! - Stage output and artifacts
//! - Persisted status flags and the promotion rule

mod artifact;
pub mod flags;
mod metrics;
mod output;
mod status;

pub use artifact::{
    require_artifact, require_non_empty_dir, sha256_file, ArtifactKind, StageArtifact,
};
pub use flags::ModelStatus;
pub use metrics::{decide_promotion, RougeScores};
pub use output::StageOutput;
pub use status::{StageId, StageStatus};
