//! Stage identifiers and execution status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Fetch and unpack the dataset archive.
    Ingestion,
    /// Check the unpacked files.
    Validation,
    /// Tokenize the raw dataset.
    Transformation,
    /// Fine-tune the model.
    Training,
    /// Score and decide promotion.
    Evaluation,
    /// Upload an accepted model.
    Pusher,
}

impl StageId {
    /// All stages in the order the full pipeline runs them.
    pub const ALL: [Self; 6] = [
        Self::Ingestion,
        Self::Validation,
        Self::Transformation,
        Self::Training,
        Self::Evaluation,
        Self::Pusher,
    ];

    /// Position of the stage in [`StageId::ALL`].
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Ingestion => 0,
            Self::Validation => 1,
            Self::Transformation => 2,
            Self::Training => 3,
            Self::Evaluation => 4,
            Self::Pusher => 5,
        }
    }

    /// Name of the stage's directory inside a run root.
    #[must_use]
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Ingestion => "data_ingestion",
            Self::Validation => "data_validation",
            Self::Transformation => "data_transformation",
            Self::Training => "model_trainer",
            Self::Evaluation => "model_evaluation",
            Self::Pusher => "model_pusher",
        }
    }

    /// Human-readable label used in log banners.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ingestion => "Data Ingestion stage",
            Self::Validation => "Data Validation stage",
            Self::Transformation => "Data Transformation stage",
            Self::Training => "Model Training stage",
            Self::Evaluation => "Model Evaluation stage",
            Self::Pusher => "Model Pusher stage",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ingestion" | "data_ingestion" => Ok(Self::Ingestion),
            "validation" | "data_validation" => Ok(Self::Validation),
            "transformation" | "data_transformation" => Ok(Self::Transformation),
            "training" | "trainer" | "model_trainer" => Ok(Self::Training),
            "evaluation" | "model_evaluation" => Ok(Self::Evaluation),
            "pusher" | "model_pusher" => Ok(Self::Pusher),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed successfully.
    Ok,
    /// Stage failed.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status lets the next stage run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}
