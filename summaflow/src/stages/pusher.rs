//! Model pusher: publish an accepted model as the new stored best.

use super::{finish, Stage, StageContext};
use crate::core::flags::ModelStatus;
use crate::core::{require_non_empty_dir, StageId, StageOutput};
use crate::errors::Result;
use async_trait::async_trait;
use tracing::info;

/// Uploads the trained model and tokenizer when evaluation accepted them.
#[derive(Debug, Default)]
pub struct ModelPusherStage;

impl ModelPusherStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let config = ctx.config();
        let layout = ctx.layout();

        let status =
            ModelStatus::read(&layout.model_status_file(&config.evaluation.status_file_name))?;
        if !status.trained_model_accepted {
            info!("trained model was not accepted, nothing to push");
            return Ok(StageOutput::ok_value("pushed", serde_json::Value::Bool(false)));
        }

        let model_dir = layout.trained_model_dir();
        let tokenizer_dir = layout.trained_tokenizer_dir();
        require_non_empty_dir(&model_dir)?;
        require_non_empty_dir(&tokenizer_dir)?;

        let bucket = ctx.model_bucket()?;
        let storage = &config.storage;
        let skip = config.pusher.skip_unchanged;
        let model = bucket
            .upload_dir(&model_dir, &storage.model_prefix, skip)
            .await?;
        let tokenizer = bucket
            .upload_dir(&tokenizer_dir, &storage.tokenizer_prefix, skip)
            .await?;

        info!(
            bucket = %bucket.bucket(),
            uploaded = model.uploaded + tokenizer.uploaded,
            unchanged = model.unchanged + tokenizer.unchanged,
            "model pushed"
        );

        Ok(StageOutput::ok_value("pushed", serde_json::Value::Bool(true))
            .with_value("bucket", serde_json::Value::String(bucket.bucket().to_string()))
            .with_value("uploaded", serde_json::json!(model.uploaded + tokenizer.uploaded))
            .with_value(
                "unchanged",
                serde_json::json!(model.unchanged + tokenizer.unchanged),
            ))
    }
}

#[async_trait]
impl Stage for ModelPusherStage {
    fn id(&self) -> StageId {
        StageId::Pusher
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.id(), self.run(ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SummarizationBackend, TrainingArguments, TrainingJob};
    use crate::storage::{StorageAdapter, StorageProvider};
    use crate::testing::fixtures::{test_config, test_context};
    use crate::testing::MockBackend;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn context_with_model(temp: &TempDir, accepted: bool) -> StageContext {
        let ctx = test_context(
            test_config(temp.path()).unwrap(),
            Arc::new(StorageProvider::memory()),
            Arc::new(MockBackend::new()),
        );
        let layout = ctx.layout();
        MockBackend::new()
            .train(&TrainingJob {
                model_ckpt: "base".to_string(),
                dataset_dir: layout.transformed_dir(),
                output_dir: layout.stage_dir(StageId::Training),
                model_dir: layout.trained_model_dir(),
                tokenizer_dir: layout.trained_tokenizer_dir(),
                args: TrainingArguments::default(),
            })
            .await
            .unwrap();
        ModelStatus::new(accepted)
            .write(&layout.model_status_file("model_status.json"))
            .unwrap();
        ctx
    }

    async fn keys(bucket: &StorageAdapter) -> Vec<String> {
        bucket
            .list("")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect()
    }

    #[tokio::test]
    async fn test_accepted_model_is_uploaded() {
        let temp = TempDir::new().unwrap();
        let ctx = context_with_model(&temp, true).await;

        let output = ModelPusherStage::new().execute(&ctx).await;

        assert!(output.is_success(), "{:?}", output.error);
        let bucket = ctx.model_bucket().unwrap();
        assert_eq!(
            keys(&bucket).await,
            vec![
                "model/config.json",
                "model/model.safetensors",
                "tokenizer/special_tokens_map.json",
                "tokenizer/tokenizer.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_model_leaves_storage_untouched() {
        let temp = TempDir::new().unwrap();
        let ctx = context_with_model(&temp, false).await;

        let output = ModelPusherStage::new().execute(&ctx).await;

        assert!(output.is_success());
        assert_eq!(output.get("pushed"), Some(&serde_json::Value::Bool(false)));
        assert!(ctx.model_bucket().unwrap().is_bucket_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_push_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let ctx = context_with_model(&temp, true).await;
        let bucket = ctx.model_bucket().unwrap();

        assert!(ModelPusherStage::new().execute(&ctx).await.is_success());
        let first = keys(&bucket).await;
        let weights = bucket.read_object("model/model.safetensors").await.unwrap();

        assert!(ModelPusherStage::new().execute(&ctx).await.is_success());
        assert_eq!(keys(&bucket).await, first);
        assert_eq!(
            bucket.read_object("model/model.safetensors").await.unwrap(),
            weights
        );
    }

    #[tokio::test]
    async fn test_missing_decision_fails() {
        let temp = TempDir::new().unwrap();
        let ctx = test_context(
            test_config(temp.path()).unwrap(),
            Arc::new(StorageProvider::memory()),
            Arc::new(MockBackend::new()),
        );

        let output = ModelPusherStage::new().execute(&ctx).await;

        assert!(output.is_failure());
        assert!(output.error.unwrap().contains("model_status.json"));
    }
}
