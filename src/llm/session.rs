use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::prompts::TaskConfig;
use super::{GenerateRequest, MediaModel, RemoteMediaHandle};
use crate::error::{AnalyzerError, Result};
use crate::retry::{retry_async, RetryConfig};

/// Issues structured-output requests against an uploaded media file
pub struct InferenceSession {
    model: Arc<dyn MediaModel>,
    timeout: Duration,
    retry: RetryConfig,
}

impl InferenceSession {
    pub fn new(model: Arc<dyn MediaModel>, timeout: Duration, retry: RetryConfig) -> Self {
        Self { model, timeout, retry }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Send `task` about `handle` and return the raw response text.
    ///
    /// Every attempt is bounded by the session timeout. Timeouts and other
    /// transient failures are retried with backoff; cancellation stops both
    /// the attempt in flight and any pending backoff.
    pub async fn request(&self, handle: &RemoteMediaHandle, task: &TaskConfig, cancel: &CancellationToken) -> Result<String> {
        let request = GenerateRequest {
            system_instruction: task.system_instruction.clone(),
            prompt: task.prompt.clone(),
            media: Some(handle.clone()),
            response_schema: Some(task.output_schema.clone()),
            sampling: task.sampling,
        };
        let operation = format!("{} request", task.kind);

        let attempts = retry_async(&self.retry, AnalyzerError::is_transient, |attempt| {
            let request = &request;
            let operation = &operation;
            async move {
                if cancel.is_cancelled() {
                    return Err(AnalyzerError::Cancelled);
                }
                debug!(file = %handle.name, attempt, "Sending {}", operation);
                match tokio::time::timeout(self.timeout, self.model.generate(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(AnalyzerError::timeout(operation.as_str(), self.timeout.as_secs())),
                }
            }
        });

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalyzerError::Cancelled),
            response = attempts => response?,
        };

        info!(
            file = %handle.name,
            tokens = response.tokens_used.unwrap_or(0),
            "🤖 {} completed ({} chars)",
            operation,
            response.content.len()
        );
        Ok(response.content)
    }
}
