//! End-to-end tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::app::SummaflowApp;
    use crate::config::{ArtifactLayout, IngestionConfig, PipelineConfig};
    use crate::core::{ModelStatus, StageId, StageStatus};
    use crate::errors::SummaflowError;
    use crate::events::CollectingEventSink;
    use crate::pipeline::PipelineBuilder;
    use crate::stages::StageContext;
    use crate::storage::StorageProvider;
    use crate::testing::fixtures::{test_config, write_samsum_zip};
    use crate::testing::MockBackend;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    const DATA_BUCKET: &str = "datasets";
    const DATA_KEY: &str = "samsum.zip";

    async fn seeded_storage(root: &Path) -> Arc<StorageProvider> {
        let archive = root.join("upload.zip");
        write_samsum_zip(&archive, None).unwrap();
        let storage = Arc::new(StorageProvider::memory());
        storage
            .bucket(DATA_BUCKET)
            .unwrap()
            .upload_file(&archive, DATA_KEY, false)
            .await
            .unwrap();
        storage
    }

    fn config(root: &Path) -> PipelineConfig {
        test_config(root)
            .unwrap()
            .with_ingestion(IngestionConfig::from_bucket(DATA_BUCKET, DATA_KEY))
    }

    fn context(
        config: &PipelineConfig,
        run_id: &str,
        storage: &Arc<StorageProvider>,
        backend: &Arc<MockBackend>,
    ) -> StageContext {
        StageContext::new(
            Arc::new(config.clone()),
            ArtifactLayout::new(config.artifacts_root.clone(), run_id),
            storage.clone(),
            backend.clone(),
        )
    }

    fn accepted(ctx: &StageContext) -> bool {
        ModelStatus::read(&ctx.layout().model_status_file("model_status.json"))
            .unwrap()
            .trained_model_accepted
    }

    #[tokio::test]
    async fn test_full_pipeline_pushes_first_model() {
        let temp = TempDir::new().unwrap();
        let storage = seeded_storage(temp.path()).await;
        let backend = Arc::new(MockBackend::new());
        let config = config(temp.path());
        let sink = Arc::new(CollectingEventSink::new());

        let pipeline = PipelineBuilder::full()
            .with_event_sink(sink.clone())
            .build()
            .unwrap();
        let ctx = context(&config, "20240101_000000", &storage, &backend);

        let result = pipeline.run(&ctx).await;

        assert!(result.is_success(), "{:?}", result.failure());
        assert_eq!(result.records.len(), 6);
        assert!(result.records.iter().all(|r| r.status == StageStatus::Ok));
        assert!(accepted(&ctx));

        let keys: Vec<String> = storage
            .model_bucket()
            .unwrap()
            .list("")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "model/config.json",
                "model/model.safetensors",
                "tokenizer/special_tokens_map.json",
                "tokenizer/tokenizer.json",
            ]
        );

        let mut expected = vec!["pipeline.started".to_string()];
        for _ in StageId::ALL {
            expected.push("stage.started".to_string());
            expected.push("stage.completed".to_string());
        }
        expected.push("pipeline.completed".to_string());
        assert_eq!(sink.event_types(), expected);

        let run_ids: Vec<serde_json::Value> = sink
            .events()
            .into_iter()
            .filter_map(|(_, data)| data.and_then(|d| d.get("pipeline_run_id").cloned()))
            .collect();
        assert_eq!(run_ids.len(), 14);
        assert!(run_ids
            .iter()
            .all(|id| id == &serde_json::json!(result.pipeline_run_id)));
    }

    #[tokio::test]
    async fn test_worse_model_is_not_pushed() {
        let temp = TempDir::new().unwrap();
        let storage = seeded_storage(temp.path()).await;
        let backend = Arc::new(MockBackend::new());
        let config = config(temp.path());
        let pipeline = PipelineBuilder::full().build().unwrap();

        backend.set_train_score(0.6);
        let first = context(&config, "20240101_000000", &storage, &backend);
        assert!(pipeline.run(&first).await.is_success());
        let bucket = storage.model_bucket().unwrap();
        let stored = bucket.read_object("model/config.json").await.unwrap();

        backend.set_train_score(0.4);
        let second = context(&config, "20240102_000000", &storage, &backend);
        let result = pipeline.run(&second).await;

        assert!(result.is_success(), "{:?}", result.failure());
        assert!(!accepted(&second));
        assert_eq!(
            result.record(StageId::Pusher).unwrap().data.get("pushed"),
            Some(&serde_json::Value::Bool(false))
        );
        assert_eq!(bucket.read_object("model/config.json").await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_equal_model_replaces_stored_best() {
        let temp = TempDir::new().unwrap();
        let storage = seeded_storage(temp.path()).await;
        let backend = Arc::new(MockBackend::new());
        let config = config(temp.path());
        let pipeline = PipelineBuilder::full().build().unwrap();

        backend.set_train_score(0.5);
        let first = context(&config, "20240101_000000", &storage, &backend);
        assert!(pipeline.run(&first).await.is_success());

        let second = context(&config, "20240102_000000", &storage, &backend);
        assert!(pipeline.run(&second).await.is_success());
        assert!(accepted(&second));
    }

    #[tokio::test]
    async fn test_validation_failure_stops_the_run() {
        let temp = TempDir::new().unwrap();
        let storage = seeded_storage(temp.path()).await;
        let backend = Arc::new(MockBackend::new());
        let mut config = config(temp.path());
        config
            .validation
            .required_files
            .push("samsum-extra.csv".to_string());
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::full()
            .with_event_sink(sink.clone())
            .build()
            .unwrap();
        let ctx = context(&config, "20240101_000000", &storage, &backend);

        let result = pipeline.run(&ctx).await;

        assert_eq!(result.failed_stage, Some(StageId::Validation));
        assert_eq!(result.records.len(), 2);
        assert_eq!(backend.train_calls(), 0);
        assert_eq!(
            sink.event_types().last().map(String::as_str),
            Some("pipeline.failed")
        );
        assert!(!ctx.layout().transformed_dir().exists());

        match result.into_result() {
            Err(SummaflowError::StageFailed { stage, message }) => {
                assert_eq!(stage, "data_validation");
                assert!(message.contains("samsum-extra.csv"));
            }
            other => panic!("expected StageFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_training_failure_skips_evaluation_and_push() {
        let temp = TempDir::new().unwrap();
        let storage = seeded_storage(temp.path()).await;
        let backend = Arc::new(MockBackend::new());
        backend.set_fail_training(true);
        let config = config(temp.path());
        let pipeline = PipelineBuilder::full().build().unwrap();
        let ctx = context(&config, "20240101_000000", &storage, &backend);

        let result = pipeline.run(&ctx).await;

        assert_eq!(result.failed_stage, Some(StageId::Training));
        assert!(result.record(StageId::Evaluation).is_none());
        assert_eq!(backend.score_calls(), 0);
        assert!(storage
            .model_bucket()
            .unwrap()
            .is_bucket_empty()
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_app_trains_and_predicts() {
        let temp = TempDir::new().unwrap();
        let storage = seeded_storage(temp.path()).await;
        let backend = Arc::new(MockBackend::new());
        backend.set_summary("Amanda baked cookies.");
        let app = SummaflowApp::new(config(temp.path()), storage, backend.clone());

        let result = app.train().await.unwrap();
        assert_eq!(result.records.len(), 6);

        let summary = app.predict("Amanda: I baked cookies.").await.unwrap();
        assert_eq!(summary, "Amanda baked cookies.");
        assert!(app
            .prediction()
            .model_dir()
            .join("model.safetensors")
            .is_file());
        assert_eq!(backend.summarize_requests()[0].text, "Amanda: I baked cookies.");
    }

    #[tokio::test]
    async fn test_app_runs_stages_one_by_one() {
        let temp = TempDir::new().unwrap();
        let storage = seeded_storage(temp.path()).await;
        let backend = Arc::new(MockBackend::new());
        let app = SummaflowApp::new(config(temp.path()), storage, backend);

        let first = app.run_stage(StageId::Ingestion, None).await.unwrap();
        assert!(first.is_success());
        for stage in &StageId::ALL[1..] {
            let record = app.run_stage(*stage, None).await.unwrap();
            assert_eq!(record.stage, *stage);
        }

        let latest = app.context_for(None).unwrap();
        assert!(accepted(&latest));
    }

    #[tokio::test]
    async fn test_app_stage_failure_is_an_error() {
        let temp = TempDir::new().unwrap();
        let app = SummaflowApp::new(
            config(temp.path()),
            Arc::new(StorageProvider::memory()),
            Arc::new(MockBackend::new()),
        );

        let err = app
            .run_stage(StageId::Pusher, Some("20240101_000000"))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Stage model_pusher failed: Missing artifact"));
    }
}
