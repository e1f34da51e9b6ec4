//! Object storage access.
//!
//! [`StorageAdapter`] binds one bucket to an [`ObjectStore`] implementation
//! (S3, a local directory, or memory) and exposes the operations the stages
//! need: uploads with unchanged-object skipping, prefix downloads, listings,
//! existence probes and last-modified lookups.
//!
//! Keys are `/`-separated. A "folder" is a key prefix; [`StorageAdapter::create_folder`]
//! materializes one with a zero-byte marker object that listings hide.

mod provider;

pub use provider::StorageProvider;

use crate::config::StorageConfig;
use crate::errors::StorageError;
use crate::utils::{list_files_recursive, Timestamp};
use futures::TryStreamExt;
use md5::{Digest, Md5};
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Name of the zero-byte object marking an explicitly created folder.
pub const FOLDER_MARKER: &str = ".folder";

/// Files larger than this are uploaded in parts of this size.
pub const DEFAULT_PART_SIZE: usize = 10 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Full object key.
    pub key: String,
    /// Last modification time reported by the store.
    pub last_modified: Timestamp,
    /// Size in bytes.
    pub size: usize,
    /// Entity tag, if the store reports one.
    pub e_tag: Option<String>,
}

impl From<ObjectMeta> for RemoteObject {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            key: meta.location.to_string(),
            last_modified: meta.last_modified,
            size: meta.size,
            e_tag: meta.e_tag,
        }
    }
}

/// What happened to a single file during an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The object was written.
    Uploaded,
    /// The stored object already had identical content.
    Unchanged,
}

/// Counts from a directory upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Files written.
    pub uploaded: usize,
    /// Files skipped because the stored copy matched.
    pub unchanged: usize,
}

impl UploadSummary {
    /// Total number of files considered.
    #[must_use]
    pub fn total(&self) -> usize {
        self.uploaded + self.unchanged
    }
}

/// A single bucket on an object store.
#[derive(Clone)]
pub struct StorageAdapter {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    part_size: usize,
}

impl fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("bucket", &self.bucket)
            .field("store", &self.store.to_string())
            .field("part_size", &self.part_size)
            .finish()
    }
}

impl StorageAdapter {
    /// Wraps an existing store.
    #[must_use]
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.into(),
            store,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Sets the multipart threshold and part size for file uploads.
    #[must_use]
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Connects to an S3 bucket. Credentials and defaults come from the
    /// standard AWS environment variables.
    pub fn s3(bucket: &str, config: &StorageConfig) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let store = builder
            .build()
            .map_err(|e| StorageError::Configuration(e.to_string()))?;
        Ok(Self::new(bucket, Arc::new(store)))
    }

    /// Uses `<root>/<bucket>` on the local filesystem as the bucket.
    pub fn local(bucket: &str, root: &Path) -> StorageResult<Self> {
        let dir = root.join(bucket);
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::local_io(&dir, e))?;
        let store = LocalFileSystem::new_with_prefix(&dir)
            .map_err(|e| StorageError::Configuration(e.to_string()))?;
        Ok(Self::new(bucket, Arc::new(store)))
    }

    /// Creates an empty in-memory bucket.
    #[must_use]
    pub fn memory(bucket: &str) -> Self {
        Self::new(bucket, Arc::new(InMemory::new()))
    }

    /// The bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn map_error(&self, operation: &'static str, key: &str, err: object_store::Error) -> StorageError {
        match err {
            object_store::Error::NotFound { .. } => StorageError::NotFound {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            },
            other => StorageError::operation(operation, &self.bucket, key, other.to_string()),
        }
    }

    /// Writes `bytes` to `key`, replacing any existing object.
    pub async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> StorageResult<()> {
        self.store
            .put(&ObjectPath::from(key), PutPayload::from(bytes))
            .await
            .map_err(|e| self.map_error("put", key, e))?;
        Ok(())
    }

    /// Uploads a local file to `key`.
    ///
    /// The file is streamed; anything larger than the part size goes up as
    /// a multipart upload. With `skip_unchanged`, an existing object whose
    /// ETag equals the file's MD5 is left alone.
    pub async fn upload_file(
        &self,
        local: &Path,
        key: &str,
        skip_unchanged: bool,
    ) -> StorageResult<UploadOutcome> {
        if skip_unchanged {
            if let Some(existing) = self.head(key).await? {
                let (digest, size) = file_md5(local)
                    .await
                    .map_err(|e| StorageError::local_io(local, e))?;
                let same_tag = existing
                    .e_tag
                    .as_deref()
                    .is_some_and(|tag| tag.trim_matches('"') == digest);
                if same_tag && existing.size == size {
                    debug!(bucket = %self.bucket, key = %key, "object unchanged, skipping upload");
                    return Ok(UploadOutcome::Unchanged);
                }
            }
        }

        info!(
            bucket = %self.bucket,
            key = %key,
            file = %local.display(),
            "uploading file"
        );
        let mut file = tokio::fs::File::open(local)
            .await
            .map_err(|e| StorageError::local_io(local, e))?;
        let mut writer =
            BufWriter::with_capacity(self.store.clone(), ObjectPath::from(key), self.part_size);

        if let Err(e) = tokio::io::copy(&mut file, &mut writer).await {
            if let Err(abort) = writer.abort().await {
                debug!(bucket = %self.bucket, key = %key, error = %abort, "multipart abort failed");
            }
            return Err(StorageError::operation("put", &self.bucket, key, e.to_string()));
        }
        writer
            .shutdown()
            .await
            .map_err(|e| StorageError::operation("put", &self.bucket, key, e.to_string()))?;
        Ok(UploadOutcome::Uploaded)
    }

    /// Uploads every file under `dir` to `<prefix>/<relative path>`.
    pub async fn upload_dir(
        &self,
        dir: &Path,
        prefix: &str,
        skip_unchanged: bool,
    ) -> StorageResult<UploadSummary> {
        let files = list_files_recursive(dir)
            .map_err(|e| StorageError::local_io(dir, std::io::Error::other(e.to_string())))?;

        let mut summary = UploadSummary::default();
        for file in files {
            let key = object_key(prefix, dir, &file);
            match self.upload_file(&file, &key, skip_unchanged).await? {
                UploadOutcome::Uploaded => summary.uploaded += 1,
                UploadOutcome::Unchanged => summary.unchanged += 1,
            }
        }

        info!(
            bucket = %self.bucket,
            prefix = %prefix,
            uploaded = summary.uploaded,
            unchanged = summary.unchanged,
            "uploaded directory"
        );
        Ok(summary)
    }

    /// Reads an object into memory.
    pub async fn read_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let result = self
            .store
            .get(&ObjectPath::from(key))
            .await
            .map_err(|e| self.map_error("get", key, e))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| self.map_error("get", key, e))?;
        Ok(bytes.to_vec())
    }

    /// Reads an object as UTF-8 text.
    pub async fn read_object_text(&self, key: &str) -> StorageResult<String> {
        let bytes = self.read_object(key).await?;
        String::from_utf8(bytes)
            .map_err(|e| StorageError::operation("get", &self.bucket, key, e.to_string()))
    }

    /// Downloads one object to `dest`, creating parent directories.
    ///
    /// The body is streamed into `<dest>.part`, which replaces `dest` once
    /// the download completes.
    pub async fn download_object(&self, key: &str, dest: &Path) -> StorageResult<()> {
        let result = self
            .store
            .get(&ObjectPath::from(key))
            .await
            .map_err(|e| self.map_error("get", key, e))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::local_io(parent, e))?;
        }

        let partial = partial_path(dest);
        let streamed = self.stream_to_file(key, result, &partial).await;
        if streamed.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        streamed?;
        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| StorageError::local_io(dest, e))?;

        debug!(bucket = %self.bucket, key = %key, dest = %dest.display(), "downloaded object");
        Ok(())
    }

    async fn stream_to_file(
        &self,
        key: &str,
        result: object_store::GetResult,
        path: &Path,
    ) -> StorageResult<()> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| StorageError::local_io(path, e))?;
        let mut stream = result.into_stream();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| self.map_error("get", key, e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::local_io(path, e))?;
        }
        file.flush()
            .await
            .map_err(|e| StorageError::local_io(path, e))
    }

    /// Lists objects under `prefix`, hiding folder markers.
    ///
    /// An empty prefix lists the whole bucket.
    pub async fn list(&self, prefix: &str) -> StorageResult<Vec<RemoteObject>> {
        let mut objects: Vec<RemoteObject> = self
            .list_raw(prefix)
            .await?
            .into_iter()
            .filter(|o| !is_folder_marker(&o.key))
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn list_raw(&self, prefix: &str) -> StorageResult<Vec<RemoteObject>> {
        let path = (!prefix.is_empty()).then(|| ObjectPath::from(prefix));
        let metas: Vec<ObjectMeta> = self
            .store
            .list(path.as_ref())
            .try_collect()
            .await
            .map_err(|e| self.map_error("list", prefix, e))?;
        Ok(metas.into_iter().map(RemoteObject::from).collect())
    }

    /// Downloads every object under `prefix` into `dest_dir`, keeping the
    /// key structure below the prefix. Returns the written paths.
    pub async fn download_prefix(&self, prefix: &str, dest_dir: &Path) -> StorageResult<Vec<PathBuf>> {
        let objects = self.list(prefix).await?;
        let mut written = Vec::with_capacity(objects.len());
        for object in objects {
            let relative = relative_key(prefix, &object.key);
            let dest = relative
                .split('/')
                .fold(dest_dir.to_path_buf(), |path, part| path.join(part));
            self.download_object(&object.key, &dest).await?;
            written.push(dest);
        }
        info!(
            bucket = %self.bucket,
            prefix = %prefix,
            count = written.len(),
            dest = %dest_dir.display(),
            "downloaded prefix"
        );
        Ok(written)
    }

    /// Returns true if at least one object exists under `prefix`.
    pub async fn is_prefix_present(&self, prefix: &str) -> StorageResult<bool> {
        Ok(!self.list(prefix).await?.is_empty())
    }

    /// Returns true if the bucket holds no objects.
    pub async fn is_bucket_empty(&self) -> StorageResult<bool> {
        Ok(self.list("").await?.is_empty())
    }

    /// Metadata of one object, or `None` if it does not exist.
    pub async fn head(&self, key: &str) -> StorageResult<Option<RemoteObject>> {
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(meta) => Ok(Some(meta.into())),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(self.map_error("head", key, e)),
        }
    }

    /// Last-modified time of an object.
    pub async fn last_modified(&self, key: &str) -> StorageResult<Timestamp> {
        self.head(key)
            .await?
            .map(|object| object.last_modified)
            .ok_or_else(|| StorageError::NotFound {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            })
    }

    /// Creates `folder` unless objects already exist under it.
    ///
    /// Returns true if a marker was written.
    pub async fn create_folder(&self, folder: &str) -> StorageResult<bool> {
        let folder = folder.trim_end_matches('/');
        if !self.list_raw(folder).await?.is_empty() {
            return Ok(false);
        }
        self.put_bytes(&format!("{folder}/{FOLDER_MARKER}"), Vec::new())
            .await?;
        info!(bucket = %self.bucket, folder = %folder, "created folder");
        Ok(true)
    }
}

fn is_folder_marker(key: &str) -> bool {
    key.rsplit('/').next() == Some(FOLDER_MARKER)
}

/// Joins `prefix` and the path of `file` relative to `dir` into an object key.
fn object_key(prefix: &str, dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(dir).unwrap_or(file);
    let mut parts: Vec<String> = Vec::new();
    let prefix = prefix.trim_matches('/');
    if !prefix.is_empty() {
        parts.push(prefix.to_string());
    }
    parts.extend(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn file_md5(path: &Path) -> std::io::Result<(String, usize)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut size = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n;
    }
    Ok((hex::encode(hasher.finalize()), size))
}

/// Strips `prefix/` from `key`.
fn relative_key<'a>(prefix: &str, key: &'a str) -> &'a str {
    let prefix = prefix.trim_matches('/');
    key.strip_prefix(prefix)
        .map_or(key, |rest| rest.trim_start_matches('/'))
}
