use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use super::{FileState, GenerateRequest, LLMResponse, MediaModel, RemoteMediaHandle};
use crate::config::GeminiConfig;
use crate::error::{AnalyzerError, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Gemini REST (v1beta) client covering the Files API and generateContent
pub struct GeminiProvider {
    config: GeminiConfig,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct UploadStart<'a> {
    file: UploadMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct UploadMetadata<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: GeminiFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiFile {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default = "unspecified_state")]
    state: FileState,
    error: Option<GeminiStatus>,
}

#[derive(Debug, Deserialize)]
struct GeminiStatus {
    #[serde(default)]
    message: String,
}

fn unspecified_state() -> FileState {
    FileState::Unspecified
}

impl From<GeminiFile> for RemoteMediaHandle {
    fn from(file: GeminiFile) -> Self {
        if let Some(error) = &file.error {
            debug!("Remote file {} reports error: {}", file.name, error.message);
        }
        Self {
            name: file.name,
            uri: file.uri,
            mime_type: file.mime_type,
            state: file.state,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<GeminiFileData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiFileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiStatus,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AnalyzerError::Config("Gemini API key required (set GEMINI_API_KEY)".into()))?;

        let base = Url::parse(&config.base_url)
            .map_err(|e| AnalyzerError::Config(format!("Invalid Gemini base URL {}: {}", config.base_url, e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base.as_str().trim_end_matches('/').to_string(),
            api_key,
            config,
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, path)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_seconds)
    }

    /// Turn a non-success response into a `RequestFailed` carrying the API message
    async fn check_status(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GeminiErrorBody>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);

        Err(AnalyzerError::request_failed(
            format!("{} returned {}: {}", context, status, message),
            Some(status.as_u16()),
        ))
    }
}

#[async_trait]
impl MediaModel for GeminiProvider {
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteMediaHandle> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video");
        let timeout = Duration::from_secs(self.config.upload_timeout_seconds);

        debug!("Starting resumable upload of {} ({} bytes)", path.display(), size);

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .timeout(self.request_timeout())
            .json(&UploadStart {
                file: UploadMetadata { display_name },
            })
            .send()
            .await?;
        let start = Self::check_status(start, "Upload start").await?;

        let upload_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AnalyzerError::fatal_request("Upload start response has no upload URL"))?;
        let upload_url = Url::parse(upload_url)
            .map_err(|e| AnalyzerError::fatal_request(format!("Invalid upload URL: {}", e)))?;

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .client
            .post(upload_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_TYPE, mime_type)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .timeout(timeout)
            .body(body)
            .send()
            .await?;
        let response = Self::check_status(response, "Upload").await?;

        let uploaded: UploadResponse = response.json().await?;
        info!("📤 Uploaded {} as {}", path.display(), uploaded.file.name);
        Ok(uploaded.file.into())
    }

    async fn get_file(&self, name: &str) -> Result<RemoteMediaHandle> {
        let response = self
            .client
            .get(self.api_url(name))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.request_timeout())
            .send()
            .await?;
        let response = Self::check_status(response, "File status").await?;

        let file: GeminiFile = response.json().await?;
        Ok(file.into())
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.api_url(name))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.request_timeout())
            .send()
            .await?;
        Self::check_status(response, "File delete").await?;
        debug!("Deleted remote file {}", name);
        Ok(())
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<LLMResponse> {
        let mut parts = Vec::new();
        if let Some(media) = &request.media {
            parts.push(GeminiPart {
                text: None,
                file_data: Some(GeminiFileData {
                    mime_type: media.mime_type.clone(),
                    file_uri: media.uri.clone(),
                }),
            });
        }
        parts.push(GeminiPart {
            text: Some(request.prompt.clone()),
            file_data: None,
        });

        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(request.system_instruction.clone()),
                    file_data: None,
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GeminiGenerationConfig {
                temperature: request.sampling.temperature,
                top_p: request.sampling.top_p,
                top_k: request.sampling.top_k,
                max_output_tokens: request.sampling.max_output_tokens,
                response_mime_type: "application/json",
                response_schema: request.response_schema.clone(),
            },
        };

        debug!("Sending request to Gemini model {}", self.config.model);

        let response = self
            .client
            .post(self.api_url(&format!("models/{}:generateContent", self.config.model)))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.request_timeout())
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response, "generateContent").await?;

        let gemini_response: GeminiResponse = response.json().await?;

        if let Some(reason) = gemini_response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(AnalyzerError::fatal_request(format!("Prompt blocked: {}", reason)));
        }

        let candidate = gemini_response
            .candidates
            .first()
            .ok_or_else(|| AnalyzerError::fatal_request("No candidates in Gemini response"))?;

        let content: String = candidate
            .content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect();

        if content.trim().is_empty() {
            return Err(AnalyzerError::fatal_request(format!(
                "Empty response from Gemini (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        let tokens_used = gemini_response.usage_metadata.map(|u| u.total_token_count);

        Ok(LLMResponse { content, tokens_used })
    }

    async fn is_available(&self) -> bool {
        let url = self.api_url(&format!("models/{}", self.config.model));
        match self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(Duration::from_secs(30))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
