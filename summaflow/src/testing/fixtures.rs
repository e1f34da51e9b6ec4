//! Test fixtures: SAMSum-style data, archives, a tokenizer and stage contexts.

use crate::backend::{DialogueSample, SummarizationBackend};
use crate::config::{ArtifactLayout, PipelineConfig, StorageConfig, StorageKind};
use crate::errors::{Result, SummaflowError};
use crate::stages::StageContext;
use crate::storage::StorageProvider;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Run id used by [`test_context`].
pub const TEST_RUN_ID: &str = "20240101_000000";

/// Name of the tokenizer file written by [`test_config`].
pub const TOKENIZER_FILE: &str = "tokenizer.json";

const SAMPLES: &[(&str, &str, &str)] = &[
    (
        "13818513",
        "Amanda: I baked cookies. Do you want some?\r\nJerry: Sure!\r\nAmanda: I'll bring you tomorrow :-)",
        "Amanda baked cookies and will bring Jerry some tomorrow.",
    ),
    (
        "13728867",
        "Olivia: Who are you voting for in this election?\r\nOliver: Liberals as always.\r\nOlivia: Me too!!",
        "Olivia and Oliver are voting for liberals in this election.",
    ),
    (
        "13681000",
        "Tim: Hi, what's up?\r\nKim: Bad mood tbh, I was going to do lots of stuff but ended up procrastinating",
        "Kim is in a bad mood because she procrastinated.",
    ),
];

/// A handful of dialogue/summary pairs.
#[must_use]
pub fn samples() -> Vec<DialogueSample> {
    SAMPLES
        .iter()
        .map(|(id, dialogue, summary)| DialogueSample {
            id: (*id).to_string(),
            dialogue: (*dialogue).to_string(),
            summary: (*summary).to_string(),
        })
        .collect()
}

/// Serializes samples as a SAMSum CSV (`id,dialogue,summary`).
pub fn samsum_csv(samples: &[DialogueSample]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer
        .into_inner()
        .map_err(|e| SummaflowError::Io(e.into_error()))
}

fn samsum_files(subdir: Option<&str>) -> Result<Vec<(String, Vec<u8>)>> {
    let csv = samsum_csv(&samples())?;
    Ok(["train", "validation", "test"]
        .iter()
        .map(|split| {
            let name = format!("samsum-{split}.csv");
            let name = match subdir {
                Some(sub) => format!("{sub}/{name}"),
                None => name,
            };
            (name, csv.clone())
        })
        .collect())
}

/// Writes the three SAMSum split files into `dir`.
pub fn write_samsum_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for (name, bytes) in samsum_files(None)? {
        std::fs::write(dir.join(name), bytes)?;
    }
    Ok(())
}

/// Writes a zip archive holding the SAMSum split files, optionally nested
/// in `subdir`.
pub fn write_samsum_zip(path: &Path, subdir: Option<&str>) -> Result<()> {
    let archive_err = |e: zip::result::ZipError| SummaflowError::Archive(e.to_string());
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, bytes) in samsum_files(subdir)? {
        zip.start_file(name, options).map_err(archive_err)?;
        zip.write_all(&bytes)?;
    }
    zip.finish().map_err(archive_err)?;
    Ok(())
}

/// Writes a gzipped tarball holding the SAMSum split files.
pub fn write_samsum_tar_gz(path: &Path, subdir: Option<&str>) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, bytes) in samsum_files(subdir)? {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, bytes.as_slice())?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

/// A lowercase word-level tokenizer in `tokenizer.json` format.
///
/// There is no post-processor, so every whitespace/punctuation piece maps
/// to exactly one id; unknown words map to `[UNK]` (id 1).
#[must_use]
pub fn tokenizer_json() -> serde_json::Value {
    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": true
        },
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {
                "[PAD]": 0,
                "[UNK]": 1,
                "summarize": 2,
                ":": 3,
                "amanda": 4,
                "jerry": 5,
                "cookies": 6,
                "baked": 7,
                "i": 8,
                ".": 9
            },
            "unk_token": "[UNK]"
        }
    })
}

/// Id of `</s>` in [`eos_tokenizer_json`].
pub const EOS_ID: u32 = 10;

/// [`tokenizer_json`] with a seq2seq-style post-processor that appends
/// `</s>` to every sequence.
#[must_use]
pub fn eos_tokenizer_json() -> serde_json::Value {
    let mut tokenizer = tokenizer_json();
    if let Some(tokens) = tokenizer["added_tokens"].as_array_mut() {
        tokens.push(serde_json::json!(
            {"id": EOS_ID, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ));
    }
    tokenizer["model"]["vocab"]["</s>"] = serde_json::json!(EOS_ID);
    tokenizer["post_processor"] = serde_json::json!({
        "type": "TemplateProcessing",
        "single": [
            {"Sequence": {"id": "A", "type_id": 0}},
            {"SpecialToken": {"id": "</s>", "type_id": 0}}
        ],
        "pair": [
            {"Sequence": {"id": "A", "type_id": 0}},
            {"SpecialToken": {"id": "</s>", "type_id": 0}},
            {"Sequence": {"id": "B", "type_id": 0}},
            {"SpecialToken": {"id": "</s>", "type_id": 0}}
        ],
        "special_tokens": {
            "</s>": {"id": "</s>", "ids": [EOS_ID], "tokens": ["</s>"]}
        }
    });
    tokenizer
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

/// Writes [`tokenizer_json`] to `path`.
pub fn write_tokenizer(path: &Path) -> Result<()> {
    write_json(path, &tokenizer_json())
}

/// Writes [`eos_tokenizer_json`] to `path`.
pub fn write_eos_tokenizer(path: &Path) -> Result<()> {
    write_json(path, &eos_tokenizer_json())
}

/// A configuration rooted at `root` with in-memory storage and the fixture
/// tokenizer. The tokenizer file is written as a side effect.
pub fn test_config(root: &Path) -> Result<PipelineConfig> {
    let tokenizer = root.join(TOKENIZER_FILE);
    write_tokenizer(&tokenizer)?;

    let mut config = PipelineConfig::new()
        .with_artifacts_root(root.join("artifacts"))
        .with_storage(StorageConfig::new(StorageKind::Memory).with_model_bucket("models"));
    config.transformation.tokenizer_file = tokenizer;
    Ok(config)
}

/// A stage context for [`TEST_RUN_ID`] over the given storage and backend.
#[must_use]
pub fn test_context(
    config: PipelineConfig,
    storage: Arc<StorageProvider>,
    backend: Arc<dyn SummarizationBackend>,
) -> StageContext {
    let layout = ArtifactLayout::new(config.artifacts_root.clone(), TEST_RUN_ID);
    StageContext::new(Arc::new(config), layout, storage, backend)
}
