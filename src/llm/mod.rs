pub mod gemini;
pub mod prompts;
pub mod readiness;
pub mod session;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::GeminiConfig;
use crate::error::Result;

/// Processing state of a file uploaded to the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
    /// Any state the service reports that we do not know; treated as pending
    #[serde(other)]
    Unspecified,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileState::Processing => "PROCESSING",
            FileState::Active => "ACTIVE",
            FileState::Failed => "FAILED",
            FileState::Unspecified => "STATE_UNSPECIFIED",
        };
        f.write_str(name)
    }
}

/// Reference to an uploaded media file and its last known state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMediaHandle {
    /// Resource name, e.g. `files/abc123`
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

impl RemoteMediaHandle {
    pub fn is_ready(&self) -> bool {
        self.state == FileState::Active
    }
}

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: Option<u32>,
}

/// One structured-output generation request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_instruction: String,
    pub prompt: String,
    pub media: Option<RemoteMediaHandle>,
    pub response_schema: Option<serde_json::Value>,
    pub sampling: SamplingParams,
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Remote multimodal model: file storage plus structured generation
#[async_trait]
pub trait MediaModel: Send + Sync {
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteMediaHandle>;
    async fn get_file(&self, name: &str) -> Result<RemoteMediaHandle>;
    async fn delete_file(&self, name: &str) -> Result<()>;
    async fn generate(&self, request: &GenerateRequest) -> Result<LLMResponse>;
    async fn is_available(&self) -> bool;
    fn model_name(&self) -> &str;
}

/// Create the remote model client from configuration
pub fn create_model(config: &GeminiConfig) -> Result<Arc<dyn MediaModel>> {
    Ok(Arc::new(gemini::GeminiProvider::new(config.clone())?))
}
