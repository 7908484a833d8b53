use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::{AnalyzerError, Result};
use crate::video::VideoProcessor;

/// A video persisted to the media staging directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedMedia {
    /// Path of the staged copy
    pub path: PathBuf,
    /// Where the video came from
    pub original: PathBuf,
    pub md5: String,
    pub size: u64,
    /// Whether `path` is a copy owned by the ingestor
    pub copied: bool,
}

/// Accepts input videos and stages them under `media_dir`
pub struct MediaIngestor {
    media_dir: PathBuf,
    processor: VideoProcessor,
}

impl MediaIngestor {
    pub fn new(media_dir: impl Into<PathBuf>, processor: VideoProcessor) -> Self {
        Self {
            media_dir: media_dir.into(),
            processor,
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub async fn ingest(&self, source: &Path) -> Result<StagedMedia> {
        let metadata = fs::metadata(source)
            .await
            .map_err(|e| ingestion_error(source, format!("cannot read file: {}", e)))?;
        if !metadata.is_file() {
            return Err(ingestion_error(source, "not a regular file".to_string()));
        }
        if metadata.len() == 0 {
            return Err(ingestion_error(source, "file is empty".to_string()));
        }
        if !self.processor.is_supported(source) {
            return Err(ingestion_error(source, "unsupported video format".to_string()));
        }

        let file_name = source
            .file_name()
            .ok_or_else(|| ingestion_error(source, "path has no file name".to_string()))?;

        fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|e| ingestion_error(source, format!("cannot create {}: {}", self.media_dir.display(), e)))?;

        let target = self.media_dir.join(file_name);
        let already_staged = match (fs::canonicalize(source).await, fs::canonicalize(&target).await) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };

        if !already_staged {
            fs::copy(source, &target)
                .await
                .map_err(|e| ingestion_error(source, format!("cannot copy to {}: {}", target.display(), e)))?;
            debug!("Copied {} to {}", source.display(), target.display());
        }

        let md5 = file_md5(&target).await?;
        info!("📥 Staged {} ({} bytes, md5 {})", target.display(), metadata.len(), md5);

        Ok(StagedMedia {
            path: target,
            original: source.to_path_buf(),
            md5,
            size: metadata.len(),
            copied: !already_staged,
        })
    }

    /// Remove the staged copy if the ingestor made one
    pub async fn release(&self, staged: &StagedMedia) {
        if !staged.copied {
            return;
        }
        match fs::remove_file(&staged.path).await {
            Ok(()) => debug!("Removed staged copy {}", staged.path.display()),
            Err(e) => warn!("Failed to remove staged copy {}: {}", staged.path.display(), e),
        }
    }
}

fn ingestion_error(path: &Path, reason: String) -> AnalyzerError {
    AnalyzerError::Ingestion {
        path: path.to_path_buf(),
        reason,
    }
}

/// Calculate MD5 hash of a file without loading it whole
pub async fn file_md5(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(format!("{:x}", context.compute()))
}
