//! Data validation: the extracted dataset must contain exactly the expected files.

use super::{finish, Stage, StageContext};
use crate::core::flags::write_validation_status;
use crate::core::{require_artifact, ArtifactKind, StageArtifact, StageId, StageOutput};
use crate::errors::Result;
use crate::utils::list_entry_names;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

/// Result of comparing a directory listing with the required file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Required names absent from the directory.
    pub missing: BTreeSet<String>,
    /// Names present but not required.
    pub unexpected: BTreeSet<String>,
}

impl ValidationReport {
    /// Compares `actual` with `required`.
    #[must_use]
    pub fn compare(actual: &BTreeSet<String>, required: &BTreeSet<String>) -> Self {
        Self {
            missing: required.difference(actual).cloned().collect(),
            unexpected: actual.difference(required).cloned().collect(),
        }
    }

    /// True when the listing equals the required set.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Checks that `dir` contains exactly `required`, writes the status flag once,
/// and returns the comparison.
pub fn validate_all_files_exist(
    dir: &Path,
    required: &[String],
    status_file: &Path,
) -> Result<ValidationReport> {
    let actual = list_entry_names(dir)?;
    let required: BTreeSet<String> = required.iter().cloned().collect();
    let report = ValidationReport::compare(&actual, &required);
    write_validation_status(status_file, report.is_valid())?;
    Ok(report)
}

/// Validates the extracted dataset.
#[derive(Debug, Default)]
pub struct DataValidationStage;

impl DataValidationStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let config = ctx.config();
        let layout = ctx.layout();
        let dir = layout.raw_dataset_dir(config.ingestion.dataset_subdir.as_deref());
        require_artifact(&dir)?;

        let status_file = layout.validation_status_file(&config.validation.status_file_name);
        let report =
            validate_all_files_exist(&dir, &config.validation.required_files, &status_file)?;
        let artifact = StageArtifact::existing(ArtifactKind::StatusFlag, &status_file)?;

        if !report.is_valid() {
            warn!(
                dir = %dir.display(),
                missing = ?report.missing,
                unexpected = ?report.unexpected,
                "dataset validation failed"
            );
            let mut output = StageOutput::fail(format!(
                "Validation status: false (missing: {:?}, unexpected: {:?})",
                report.missing, report.unexpected
            ));
            output.artifacts.push(artifact);
            return Ok(output);
        }

        info!(dir = %dir.display(), "dataset validation passed");
        Ok(StageOutput::ok_value("validation_status", serde_json::json!(true))
            .with_artifact(artifact))
    }
}

#[async_trait]
impl Stage for DataValidationStage {
    fn id(&self) -> StageId {
        StageId::Validation
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.id(), self.run(ctx))
    }
}
