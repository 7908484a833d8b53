use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AnalyzerError, Result};
use crate::retry::RetryConfig;

/// Configuration for the Badminton Analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote model settings
    pub gemini: GeminiConfig,

    /// Remote file readiness polling
    pub polling: PollingConfig,

    /// Retry policy for transient request failures
    pub retry: RetrySettings,

    /// Local media staging and clip output
    pub media: MediaConfig,

    /// Per-segment processing settings
    pub processing: ProcessingConfig,

    /// Prompt override files
    pub prompts: PromptConfig,

    /// Output and logging settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key (usually from GEMINI_API_KEY)
    pub api_key: Option<String>,

    /// API base URL
    pub base_url: String,

    /// Model to use
    pub model: String,

    /// Maximum tokens to generate (model default when unset)
    pub max_output_tokens: Option<u32>,

    /// Timeout for a single file upload (seconds)
    pub upload_timeout_seconds: u64,

    /// Timeout for a single generation request (seconds)
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between remote file status checks (seconds)
    pub interval_seconds: u64,

    /// Give up waiting for a file to become ACTIVE after this long (seconds)
    pub max_wait_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Backoff base, doubled per attempt (milliseconds)
    pub base_delay_ms: u64,

    /// Backoff ceiling (milliseconds)
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory where ingested videos are staged
    pub media_dir: PathBuf,

    /// Directory for per-rally clips
    pub segments_dir: PathBuf,

    /// Accepted container extensions
    pub supported_extensions: Vec<String>,

    /// Remove the staged copy once the run finishes
    pub cleanup_staged: bool,

    /// Remove rally clips once they have been analyzed
    pub cleanup_segments: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Segments analyzed at once (1 = strictly sequential)
    pub max_concurrent_segments: usize,

    /// Delete remote copies after each request
    pub delete_remote_files: bool,
}

/// Configuration for all LLM prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Base directory for prompt files
    pub prompt_dir: PathBuf,

    /// Segmentation system instruction file
    pub segment_instruction_file: String,

    /// Segmentation user prompt file
    pub segment_prompt_file: String,

    /// Rally analysis system instruction file
    pub analyze_instruction_file: String,

    /// Rally analysis user prompt file
    pub analyze_prompt_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Base output directory
    pub base_dir: PathBuf,

    /// File name of the JSON match report
    pub report_file: String,

    /// Log level
    pub log_level: String,
}

impl PromptConfig {
    /// Load prompt content from a specific file
    pub async fn load_prompt(&self, filename: &str) -> Result<String> {
        let path = self.prompt_dir.join(filename);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content.trim().to_string()),
            Err(e) => Err(AnalyzerError::Config(format!(
                "Failed to load prompt from {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self, operation_name: &str) -> RetryConfig {
        RetryConfig::new(operation_name)
            .with_max_retries(self.max_retries)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

impl Config {
    /// Load configuration from an explicit file, or the first default location found
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::from_default_locations(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            AnalyzerError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = toml::from_str(&config_str).map_err(|e| {
            AnalyzerError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    fn from_default_locations() -> Self {
        let config_paths = ["badminton-analyzer.toml", "config/badminton-analyzer.toml"];

        for path in &config_paths {
            let path = Path::new(path);
            if !path.exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("{}", e),
            }
        }

        tracing::debug!("No configuration file found, using defaults");
        Self::default()
    }

    /// Override settings with environment variables
    pub fn apply_env(&mut self) {
        if let Ok(api_key) = std::env::var("GEMINI_API_KEY") {
            if !api_key.trim().is_empty() {
                self.gemini.api_key = Some(api_key);
            }
        }

        if let Ok(model) = std::env::var("BADMINTON_ANALYZER_MODEL") {
            self.gemini.model = model;
        }

        if let Ok(interval) = std::env::var("BADMINTON_ANALYZER_POLL_INTERVAL") {
            self.polling.interval_seconds = interval.parse().unwrap_or(self.polling.interval_seconds);
        }

        if let Ok(max_wait) = std::env::var("BADMINTON_ANALYZER_MAX_WAIT") {
            self.polling.max_wait_seconds = max_wait.parse().unwrap_or(self.polling.max_wait_seconds);
        }

        if let Ok(workers) = std::env::var("BADMINTON_ANALYZER_CONCURRENCY") {
            self.processing.max_concurrent_segments =
                workers.parse().unwrap_or(self.processing.max_concurrent_segments);
        }

        if let Ok(output_dir) = std::env::var("BADMINTON_ANALYZER_OUTPUT_DIR") {
            self.output.base_dir = PathBuf::from(output_dir);
        }

        if let Ok(log_level) = std::env::var("BADMINTON_ANALYZER_LOG_LEVEL") {
            self.output.log_level = log_level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| AnalyzerError::Config(format!("Cannot serialize config: {}", e)))?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_seconds == 0 {
            return Err(AnalyzerError::Config("polling.interval_seconds must be greater than 0".into()));
        }

        if self.polling.max_wait_seconds < self.polling.interval_seconds {
            return Err(AnalyzerError::Config(
                "polling.max_wait_seconds must be at least one poll interval".into(),
            ));
        }

        if self.gemini.request_timeout_seconds == 0 || self.gemini.upload_timeout_seconds == 0 {
            return Err(AnalyzerError::Config("gemini timeouts must be greater than 0".into()));
        }

        if self.processing.max_concurrent_segments == 0 {
            return Err(AnalyzerError::Config(
                "processing.max_concurrent_segments must be greater than 0".into(),
            ));
        }

        if self.media.supported_extensions.is_empty() {
            return Err(AnalyzerError::Config("media.supported_extensions is empty".into()));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    pub fn report_path(&self) -> PathBuf {
        self.output.base_dir.join(&self.output.report_file)
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Badminton Analyzer Configuration:\n\
            - Model: {}\n\
            - API key: {}\n\
            - Poll interval: {}s (max wait {}s)\n\
            - Request timeout: {}s, retries: {}\n\
            - Concurrent segments: {}\n\
            - Media dir: {}\n\
            - Segments dir: {}\n\
            - Output dir: {}",
            self.gemini.model,
            if self.gemini.api_key.is_some() { "set" } else { "missing" },
            self.polling.interval_seconds,
            self.polling.max_wait_seconds,
            self.gemini.request_timeout_seconds,
            self.retry.max_retries,
            self.processing.max_concurrent_segments,
            self.media.media_dir.display(),
            self.media.segments_dir.display(),
            self.output.base_dir.display(),
        )
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash".to_string(),
            max_output_tokens: None,
            upload_timeout_seconds: 300,
            request_timeout_seconds: 600, // 10 minutes per generation
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            max_wait_seconds: 600,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("medias"),
            segments_dir: PathBuf::from("video_segments"),
            supported_extensions: vec![
                "mp4".to_string(),
                "avi".to_string(),
                "mov".to_string(),
                "mkv".to_string(),
            ],
            cleanup_staged: true,
            cleanup_segments: false,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_segments: 1,
            delete_remote_files: true,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            prompt_dir: PathBuf::from("config/prompts"),
            segment_instruction_file: "segment_instruction.txt".to_string(),
            segment_prompt_file: "segment_prompt.txt".to_string(),
            analyze_instruction_file: "analyze_instruction.txt".to_string(),
            analyze_prompt_file: "analyze_prompt.txt".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./output"),
            report_file: "match_report.json".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.gemini.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.gemini.base_url = base_url.into();
        self
    }

    pub fn with_poll_interval(mut self, seconds: u64) -> Self {
        self.config.polling.interval_seconds = seconds;
        self
    }

    pub fn with_max_wait(mut self, seconds: u64) -> Self {
        self.config.polling.max_wait_seconds = seconds;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn with_concurrency(mut self, segments: usize) -> Self {
        self.config.processing.max_concurrent_segments = segments;
        self
    }

    pub fn with_media_dir(mut self, dir: PathBuf) -> Self {
        self.config.media.media_dir = dir;
        self
    }

    pub fn with_segments_dir(mut self, dir: PathBuf) -> Self {
        self.config.media.segments_dir = dir;
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.base_dir = dir;
        self
    }

    pub fn with_prompt_dir(mut self, dir: PathBuf) -> Self {
        self.config.prompts.prompt_dir = dir;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
