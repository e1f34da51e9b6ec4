//! Data transformation: tokenize dialogue/summary pairs into model inputs.
//!
//! Each split CSV (`id,dialogue,summary`) becomes `<split>.jsonl` in the
//! stage directory, one [`TokenizedRecord`] per line, plus a
//! `dataset_dict.json` manifest listing the splits and their row counts.

use super::{finish, Stage, StageContext};
use crate::backend::DialogueSample;
use crate::config::TransformationConfig;
use crate::core::flags::read_validation_status;
use crate::core::{require_artifact, ArtifactKind, StageArtifact, StageId, StageOutput};
use crate::errors::{Result, SummaflowError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

/// File name of the split manifest.
pub const DATASET_MANIFEST: &str = "dataset_dict.json";

/// One tokenized sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedRecord {
    /// Sample id.
    pub id: String,
    /// Original dialogue.
    pub dialogue: String,
    /// Reference summary.
    pub summary: String,
    /// Token ids of the prefixed dialogue.
    pub input_ids: Vec<u32>,
    /// Attention mask matching `input_ids`.
    pub attention_mask: Vec<u32>,
    /// Token ids of the summary.
    pub labels: Vec<u32>,
}

impl TokenizedRecord {
    /// The untokenized sample.
    #[must_use]
    pub fn sample(&self) -> DialogueSample {
        DialogueSample {
            id: self.id.clone(),
            dialogue: self.dialogue.clone(),
            summary: self.summary.clone(),
        }
    }
}

/// Describes the persisted dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Split names in processing order.
    pub splits: Vec<String>,
    /// Row count per split.
    pub num_rows: BTreeMap<String, usize>,
    /// Input truncation length used.
    pub max_input_length: usize,
    /// Label truncation length used.
    pub max_target_length: usize,
}

impl DatasetManifest {
    /// Reads the manifest from a transformed dataset directory.
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(DATASET_MANIFEST);
        require_artifact(&path)?;
        Ok(serde_json::from_slice(&std::fs::read(&path)?)?)
    }
}

/// Turns samples into model inputs with a `tokenizer.json` tokenizer.
///
/// Inputs and labels use separate copies of the tokenizer, each truncating
/// to its own length. Truncation leaves room for the special tokens the
/// post-processor appends, so a trailing EOS survives.
#[derive(Debug)]
pub struct SummaryEncoder {
    inputs: Tokenizer,
    targets: Tokenizer,
    prefix: String,
}

fn truncating(mut tokenizer: Tokenizer, max_length: usize) -> Result<Tokenizer> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..TruncationParams::default()
        }))
        .map_err(|e| SummaflowError::Tokenizer(format!("max length {max_length}: {e}")))?;
    Ok(tokenizer)
}

impl SummaryEncoder {
    /// Loads the tokenizer named in `config`.
    pub fn from_config(config: &TransformationConfig) -> Result<Self> {
        let path = &config.tokenizer_file;
        require_artifact(path)?;
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            SummaflowError::Tokenizer(format!("cannot load {}: {e}", path.display()))
        })?;
        Ok(Self {
            inputs: truncating(tokenizer.clone(), config.max_input_length)?,
            targets: truncating(tokenizer, config.max_target_length)?,
            prefix: config.input_prefix.clone(),
        })
    }

    fn token_ids(tokenizer: &Tokenizer, text: &str) -> Result<(Vec<u32>, Vec<u32>)> {
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| SummaflowError::Tokenizer(e.to_string()))?;
        Ok((
            encoding.get_ids().to_vec(),
            encoding.get_attention_mask().to_vec(),
        ))
    }

    /// Encodes one sample. Inputs are prefixed and truncated to
    /// `max_input_length` tokens; labels to `max_target_length`.
    pub fn encode(&self, sample: &DialogueSample) -> Result<TokenizedRecord> {
        let input = format!("{}{}", self.prefix, sample.dialogue);
        let (input_ids, attention_mask) = Self::token_ids(&self.inputs, &input)?;
        let (labels, _) = Self::token_ids(&self.targets, &sample.summary)?;
        Ok(TokenizedRecord {
            id: sample.id.clone(),
            dialogue: sample.dialogue.clone(),
            summary: sample.summary.clone(),
            input_ids,
            attention_mask,
            labels,
        })
    }
}

/// Reads a SAMSum CSV file.
pub fn load_samsum_split(path: &Path) -> Result<Vec<DialogueSample>> {
    require_artifact(path)?;
    let mut reader = csv::Reader::from_path(path)?;
    let mut samples = Vec::new();
    for row in reader.deserialize() {
        samples.push(row?);
    }
    Ok(samples)
}

/// Path of a split's JSONL file.
#[must_use]
pub fn split_path(dir: &Path, split: &str) -> PathBuf {
    dir.join(format!("{split}.jsonl"))
}

/// Reads up to `limit` records of a transformed split.
pub fn read_split(dir: &Path, split: &str, limit: Option<usize>) -> Result<Vec<TokenizedRecord>> {
    let path = split_path(dir, split);
    require_artifact(&path)?;
    let reader = BufReader::new(File::open(&path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        if limit.is_some_and(|l| records.len() >= l) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

fn write_split(path: &Path, records: &[TokenizedRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Tokenizes every split under `raw_dir` into `out_dir`.
pub fn transform_dataset(
    config: &TransformationConfig,
    raw_dir: &Path,
    out_dir: &Path,
) -> Result<DatasetManifest> {
    let encoder = SummaryEncoder::from_config(config)?;
    std::fs::create_dir_all(out_dir)?;

    let mut num_rows = BTreeMap::new();
    for split in &config.splits {
        let csv_path = raw_dir.join(config.split_file_name(split));
        let samples = load_samsum_split(&csv_path)?;
        info!(split = %split, rows = samples.len(), file = %csv_path.display(), "loaded split");

        let records = samples
            .iter()
            .map(|s| encoder.encode(s))
            .collect::<Result<Vec<_>>>()?;
        write_split(&split_path(out_dir, split), &records)?;
        num_rows.insert(split.clone(), records.len());
    }

    let manifest = DatasetManifest {
        splits: config.splits.clone(),
        num_rows,
        max_input_length: config.max_input_length,
        max_target_length: config.max_target_length,
    };
    std::fs::write(
        out_dir.join(DATASET_MANIFEST),
        serde_json::to_vec_pretty(&manifest)?,
    )?;
    Ok(manifest)
}

/// Tokenizes the validated dataset.
#[derive(Debug, Default)]
pub struct DataTransformationStage;

impl DataTransformationStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let config = ctx.config();
        let layout = ctx.layout();

        let status_file = layout.validation_status_file(&config.validation.status_file_name);
        if !read_validation_status(&status_file)? {
            return Err(SummaflowError::Validation(
                "dataset did not pass validation".to_string(),
            ));
        }

        let raw_dir = layout.raw_dataset_dir(config.ingestion.dataset_subdir.as_deref());
        let out_dir = layout.transformed_dir();
        let transformation = config.transformation.clone();
        let dir = out_dir.clone();

        let manifest = tokio::task::spawn_blocking(move || {
            transform_dataset(&transformation, &raw_dir, &dir)
        })
        .await
        .map_err(|e| SummaflowError::Tokenizer(format!("transformation task failed: {e}")))??;

        info!(dir = %out_dir.display(), rows = ?manifest.num_rows, "dataset transformed");

        Ok(StageOutput::ok_value("num_rows", serde_json::to_value(&manifest.num_rows)?)
            .with_value(
                "dataset_dir",
                serde_json::Value::String(out_dir.display().to_string()),
            )
            .with_artifact(StageArtifact::new(ArtifactKind::TokenizedDataset, &out_dir))
            .with_artifact(StageArtifact::existing(
                ArtifactKind::Manifest,
                out_dir.join(DATASET_MANIFEST),
            )?))
    }
}

#[async_trait]
impl Stage for DataTransformationStage {
    fn id(&self) -> StageId {
        StageId::Transformation
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.id(), self.run(ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flags::write_validation_status;
    use crate::storage::StorageProvider;
    use crate::testing::fixtures::{
        samples, test_config, test_context, write_eos_tokenizer, write_samsum_dir, EOS_ID,
    };
    use crate::testing::MockBackend;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn encoder(root: &Path, max_input: usize, max_target: usize) -> SummaryEncoder {
        let config = test_config(root).unwrap();
        SummaryEncoder::from_config(
            &config
                .transformation
                .with_max_lengths(max_input, max_target),
        )
        .unwrap()
    }

    #[test]
    fn test_encode_prefixes_input() {
        let temp = TempDir::new().unwrap();
        let encoder = encoder(temp.path(), 1024, 128);
        let sample = DialogueSample {
            id: "1".to_string(),
            dialogue: "Amanda: cookies".to_string(),
            summary: "Amanda baked cookies.".to_string(),
        };

        let record = encoder.encode(&sample).unwrap();

        // "summarize : amanda : cookies"
        assert_eq!(record.input_ids, vec![2, 3, 4, 3, 6]);
        assert_eq!(record.attention_mask, vec![1, 1, 1, 1, 1]);
        // "amanda baked cookies ."
        assert_eq!(record.labels, vec![4, 7, 6, 9]);
    }

    #[test]
    fn test_encode_truncates() {
        let temp = TempDir::new().unwrap();
        let encoder = encoder(temp.path(), 3, 2);
        let sample = DialogueSample {
            id: "1".to_string(),
            dialogue: "Amanda: cookies".to_string(),
            summary: "Amanda baked cookies.".to_string(),
        };

        let record = encoder.encode(&sample).unwrap();

        assert_eq!(record.input_ids, vec![2, 3, 4]);
        assert_eq!(record.attention_mask.len(), 3);
        assert_eq!(record.labels, vec![4, 7]);
    }

    #[test]
    fn test_truncation_keeps_eos() {
        let temp = TempDir::new().unwrap();
        let mut config = test_config(temp.path()).unwrap();
        let eos_tokenizer = temp.path().join("eos-tokenizer.json");
        write_eos_tokenizer(&eos_tokenizer).unwrap();
        config.transformation.tokenizer_file = eos_tokenizer;
        let sample = DialogueSample {
            id: "1".to_string(),
            dialogue: "Amanda: cookies".to_string(),
            summary: "Amanda baked cookies.".to_string(),
        };

        let full = SummaryEncoder::from_config(&config.transformation)
            .unwrap()
            .encode(&sample)
            .unwrap();
        assert_eq!(full.input_ids, vec![2, 3, 4, 3, 6, EOS_ID]);

        let truncated =
            SummaryEncoder::from_config(&config.transformation.with_max_lengths(3, 2))
                .unwrap()
                .encode(&sample)
                .unwrap();
        assert_eq!(truncated.input_ids, vec![2, 3, EOS_ID]);
        assert_eq!(truncated.attention_mask, vec![1, 1, 1]);
        assert_eq!(truncated.labels, vec![4, EOS_ID]);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let temp = TempDir::new().unwrap();
        let encoder = encoder(temp.path(), 1024, 128);
        let sample = DialogueSample {
            id: "1".to_string(),
            dialogue: "Zebra".to_string(),
            summary: "Quokka".to_string(),
        };

        let record = encoder.encode(&sample).unwrap();

        assert_eq!(record.input_ids, vec![2, 3, 1]);
        assert_eq!(record.labels, vec![1]);
    }

    #[test]
    fn test_transform_and_read_back() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path()).unwrap();
        let raw = temp.path().join("raw");
        let out = temp.path().join("out");
        write_samsum_dir(&raw).unwrap();

        let manifest = transform_dataset(&config.transformation, &raw, &out).unwrap();

        assert_eq!(manifest.splits, vec!["train", "validation", "test"]);
        assert_eq!(manifest.num_rows.get("test"), Some(&samples().len()));
        assert_eq!(DatasetManifest::read(&out).unwrap(), manifest);

        let test_rows = read_split(&out, "test", Some(2)).unwrap();
        assert_eq!(test_rows.len(), 2);
        assert_eq!(test_rows[0].sample(), samples()[0]);
    }

    #[tokio::test]
    async fn test_stage_requires_passed_validation() {
        let temp = TempDir::new().unwrap();
        let ctx = test_context(
            test_config(temp.path()).unwrap(),
            Arc::new(StorageProvider::memory()),
            Arc::new(MockBackend::new()),
        );
        write_samsum_dir(&ctx.layout().unzip_dir()).unwrap();
        write_validation_status(&ctx.layout().validation_status_file("status.txt"), false)
            .unwrap();

        let output = DataTransformationStage::new().execute(&ctx).await;

        assert!(output.is_failure());
        assert!(output.error.unwrap().contains("did not pass validation"));
    }

    #[tokio::test]
    async fn test_stage_writes_splits() {
        let temp = TempDir::new().unwrap();
        let ctx = test_context(
            test_config(temp.path()).unwrap(),
            Arc::new(StorageProvider::memory()),
            Arc::new(MockBackend::new()),
        );
        write_samsum_dir(&ctx.layout().unzip_dir()).unwrap();
        write_validation_status(&ctx.layout().validation_status_file("status.txt"), true)
            .unwrap();

        let output = DataTransformationStage::new().execute(&ctx).await;

        assert!(output.is_success(), "{:?}", output.error);
        for split in ["train", "validation", "test"] {
            assert!(split_path(&ctx.layout().transformed_dir(), split).is_file());
        }
    }
}
