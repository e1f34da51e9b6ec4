//! Bucket handles built from configuration.

use super::{StorageAdapter, StorageResult};
use crate::config::{StorageConfig, StorageKind};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Hands out one [`StorageAdapter`] per bucket name.
///
/// Adapters are cached, so every caller asking for the same bucket shares the
/// same store. For the in-memory kind this is what makes objects written by
/// one stage visible to the next.
#[derive(Debug)]
pub struct StorageProvider {
    config: StorageConfig,
    buckets: Mutex<HashMap<String, StorageAdapter>>,
}

impl StorageProvider {
    /// Creates a provider for the configured store kind.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a provider backed by in-memory buckets.
    #[must_use]
    pub fn memory() -> Self {
        Self::new(StorageConfig::new(StorageKind::Memory))
    }

    /// The storage configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the adapter for `bucket`, connecting on first use.
    pub fn bucket(&self, bucket: &str) -> StorageResult<StorageAdapter> {
        let mut buckets = self.buckets.lock();
        if let Some(adapter) = buckets.get(bucket) {
            return Ok(adapter.clone());
        }

        let adapter = match self.config.kind {
            StorageKind::S3 => StorageAdapter::s3(bucket, &self.config)?,
            StorageKind::Local => StorageAdapter::local(bucket, &self.config.local_root)?,
            StorageKind::Memory => StorageAdapter::memory(bucket),
        };
        buckets.insert(bucket.to_string(), adapter.clone());
        Ok(adapter)
    }

    /// The bucket holding the current best model.
    pub fn model_bucket(&self) -> StorageResult<StorageAdapter> {
        self.bucket(&self.config.model_bucket)
    }

    /// Registers a pre-built adapter, replacing any cached one.
    pub fn register(&self, adapter: StorageAdapter) {
        self.buckets
            .lock()
            .insert(adapter.bucket().to_string(), adapter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_buckets_are_shared() {
        let provider = StorageProvider::memory();
        provider
            .bucket("datasets")
            .unwrap()
            .put_bytes("samsum.zip", vec![1, 2, 3])
            .await
            .unwrap();

        let again = provider.bucket("datasets").unwrap();
        assert_eq!(again.read_object("samsum.zip").await.unwrap(), vec![1, 2, 3]);
        assert!(provider.bucket("other").unwrap().is_bucket_empty().await.unwrap());
    }

    #[test]
    fn test_model_bucket_uses_configured_name() {
        let provider = StorageProvider::new(
            StorageConfig::new(StorageKind::Memory).with_model_bucket("best"),
        );
        assert_eq!(provider.model_bucket().unwrap().bucket(), "best");
    }

    #[test]
    fn test_local_buckets_live_under_root() {
        let temp = TempDir::new().unwrap();
        let provider = StorageProvider::new(
            StorageConfig::new(StorageKind::Local).with_local_root(temp.path()),
        );
        provider.bucket("models").unwrap();
        assert!(temp.path().join("models").is_dir());
    }
}
