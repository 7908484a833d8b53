use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{FileState, MediaModel, RemoteMediaHandle};
use crate::config::PollingConfig;
use crate::error::{AnalyzerError, Result};
use crate::retry::{retry_async, wait_until, RetryConfig, WaitError};
use crate::video::mime_type_for;

/// Uploads media and holds it back until the remote copy is usable for inference
pub struct ReadinessGate {
    model: Arc<dyn MediaModel>,
    poll_interval: Duration,
    max_wait: Duration,
    retry: RetryConfig,
}

impl ReadinessGate {
    pub fn new(model: Arc<dyn MediaModel>, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            model,
            poll_interval,
            max_wait,
            retry: RetryConfig::new("upload"),
        }
    }

    pub fn from_config(model: Arc<dyn MediaModel>, polling: &PollingConfig) -> Self {
        Self::new(model, polling.interval(), polling.max_wait())
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Upload a local video; transient upload failures are retried
    pub async fn submit(&self, path: &Path) -> Result<RemoteMediaHandle> {
        let mime_type = mime_type_for(path).ok_or_else(|| AnalyzerError::Ingestion {
            path: path.to_path_buf(),
            reason: "unsupported video extension".to_string(),
        })?;

        let handle = retry_async(&self.retry, AnalyzerError::is_transient, |_| {
            self.model.upload_file(path, mime_type)
        })
        .await?;

        debug!(file = %handle.name, state = %handle.state, "Submitted {}", path.display());
        Ok(handle)
    }

    /// Wait until `handle` is ACTIVE.
    ///
    /// A FAILED state, or a file still pending when `max_wait` runs out, is
    /// `ProcessingFailed`. Transient status-check errors count as still pending.
    pub async fn await_ready(&self, handle: RemoteMediaHandle, cancel: &CancellationToken) -> Result<RemoteMediaHandle> {
        match handle.state {
            FileState::Active => return Ok(handle),
            FileState::Failed => return Err(processing_failed(&handle.name, "remote processing failed")),
            FileState::Processing | FileState::Unspecified => {}
        }

        let name = handle.name.clone();
        info!(file = %name, "⏳ Waiting for remote file to become ACTIVE");

        let ready = wait_until(self.poll_interval, self.max_wait, cancel, || async {
            match self.model.get_file(&name).await {
                Ok(current) => match current.state {
                    FileState::Active => Ok(Some(current)),
                    FileState::Failed => Err(processing_failed(&name, "remote processing failed")),
                    state => {
                        debug!(file = %name, %state, "Remote file not ready yet");
                        Ok(None)
                    }
                },
                Err(e) if e.is_transient() => {
                    warn!(file = %name, "Status check failed, will poll again: {}", e);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await;

        match ready {
            Ok(current) => {
                info!(file = %name, "✅ Remote file is ACTIVE");
                Ok(current)
            }
            Err(WaitError::Deadline(waited)) => Err(processing_failed(
                &name,
                &format!("still not ACTIVE after {}s", waited.as_secs()),
            )),
            Err(WaitError::Cancelled) => Err(AnalyzerError::Cancelled),
            Err(WaitError::Poll(e)) => Err(e),
        }
    }

    /// Upload and wait for readiness. The remote copy is released when waiting fails.
    pub async fn submit_and_wait(&self, path: &Path, cancel: &CancellationToken) -> Result<RemoteMediaHandle> {
        if cancel.is_cancelled() {
            return Err(AnalyzerError::Cancelled);
        }
        let handle = self.submit(path).await?;
        let name = handle.name.clone();

        match self.await_ready(handle, cancel).await {
            Ok(ready) => Ok(ready),
            Err(e) => {
                self.release_by_name(&name).await;
                Err(e)
            }
        }
    }

    /// Delete the remote copy; failures are logged only
    pub async fn release(&self, handle: &RemoteMediaHandle) {
        self.release_by_name(&handle.name).await;
    }

    pub async fn release_by_name(&self, name: &str) {
        if let Err(e) = self.model.delete_file(name).await {
            warn!(file = %name, "Failed to delete remote file: {}", e);
        }
    }
}

fn processing_failed(name: &str, reason: &str) -> AnalyzerError {
    AnalyzerError::ProcessingFailed {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
