//! Data ingestion: fetch the dataset archive and unpack it.
//!
//! The archive comes from an HTTP(S) URL or from a bucket. An archive already
//! present in the run's ingestion directory is reused as is.

use super::{finish, Stage, StageContext};
use crate::config::IngestionConfig;
use crate::core::{ArtifactKind, StageArtifact, StageId, StageOutput};
use crate::errors::{Result, SummaflowError};
use crate::utils::{create_directories, get_size};
use async_trait::async_trait;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Archive formats the stage can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.zip`
    Zip,
    /// `.tar.gz` or `.tgz`
    TarGz,
}

impl ArchiveFormat {
    /// Detects the format from the file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else {
            Err(SummaflowError::Archive(format!(
                "unsupported archive format: {}",
                path.display()
            )))
        }
    }
}

/// Unpacks `archive` into `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let file = File::open(archive)?;
    match ArchiveFormat::from_path(archive)? {
        ArchiveFormat::Zip => {
            let mut zip =
                zip::ZipArchive::new(file).map_err(|e| SummaflowError::Archive(e.to_string()))?;
            zip.extract(dest)
                .map_err(|e| SummaflowError::Archive(e.to_string()))?;
        }
        ArchiveFormat::TarGz => {
            let decoder = flate2::read::GzDecoder::new(file);
            tar::Archive::new(decoder)
                .unpack(dest)
                .map_err(|e| SummaflowError::Archive(e.to_string()))?;
        }
    }
    Ok(())
}

/// Fetches and unpacks the dataset archive.
#[derive(Debug, Default)]
pub struct DataIngestionStage;

impl DataIngestionStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn download_file(&self, ctx: &StageContext, archive: &Path) -> Result<()> {
        let config = &ctx.config().ingestion;

        if archive.exists() {
            info!(
                path = %archive.display(),
                size = %get_size(archive)?,
                "archive already exists, reusing it"
            );
            return Ok(());
        }

        if let Some(url) = &config.source_url {
            download_url(url, archive, config).await?;
            if let Some(mirror) = &config.mirror_bucket {
                ctx.storage()
                    .bucket(mirror)?
                    .upload_file(archive, &config.source_key, true)
                    .await?;
                info!(bucket = %mirror, key = %config.source_key, "mirrored archive");
            }
        } else if let Some(bucket) = &config.source_bucket {
            ctx.storage()
                .bucket(bucket)?
                .download_object(&config.source_key, archive)
                .await?;
            info!(bucket = %bucket, key = %config.source_key, "downloaded archive from bucket");
        } else {
            return Err(SummaflowError::Config(
                "no dataset source configured: set ingestion.source_url or ingestion.source_bucket"
                    .to_string(),
            ));
        }

        info!(path = %archive.display(), size = %get_size(archive)?, "archive downloaded");
        Ok(())
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let layout = ctx.layout();
        let archive = layout.archive_path(&ctx.config().ingestion.archive_name);
        let unzip_dir = layout.unzip_dir();
        create_directories(&[layout.stage_dir(StageId::Ingestion), unzip_dir.clone()])?;

        self.download_file(ctx, &archive).await?;

        let (src, dest) = (archive.clone(), unzip_dir.clone());
        tokio::task::spawn_blocking(move || extract_archive(&src, &dest))
            .await
            .map_err(|e| SummaflowError::Archive(format!("extraction task failed: {e}")))??;
        info!(dest = %unzip_dir.display(), "archive extracted");

        Ok(StageOutput::ok_empty()
            .with_value("archive", path_value(&archive))
            .with_value("unzip_dir", path_value(&unzip_dir))
            .with_artifact(StageArtifact::existing(ArtifactKind::Archive, &archive)?)
            .with_artifact(StageArtifact::new(ArtifactKind::RawDataset, &unzip_dir)))
    }
}

async fn download_url(url: &str, dest: &Path, config: &IngestionConfig) -> Result<()> {
    info!(url = %url, dest = %dest.display(), "downloading archive");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    tokio::fs::write(dest, &bytes).await?;
    Ok(())
}

fn path_value(path: &Path) -> serde_json::Value {
    serde_json::Value::String(path.display().to_string())
}

#[async_trait]
impl Stage for DataIngestionStage {
    fn id(&self) -> StageId {
        StageId::Ingestion
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.id(), self.run(ctx).await)
    }
}
