//! Error types for the rally analysis pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Errors raised anywhere between ingestion and aggregation
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Remote file {name} did not become ACTIVE: {reason}")]
    ProcessingFailed { name: String, reason: String },

    #[error("Request failed: {message}")]
    RequestFailed {
        message: String,
        status: Option<u16>,
        transient: bool,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Invalid model response: {0}")]
    Decode(#[from] DecodeError),

    #[error("Clip {index} could not be produced: {reason}")]
    Clip { index: usize, reason: String },

    #[error("Failed to ingest {path}: {reason}")]
    Ingestion { path: PathBuf, reason: String },

    #[error("Failed to probe {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalyzerError {
    pub fn request_failed(message: impl Into<String>, status: Option<u16>) -> Self {
        let transient = match status {
            Some(code) => code == 408 || code == 429 || code >= 500,
            None => true,
        };
        Self::RequestFailed {
            message: message.into(),
            status,
            transient,
        }
    }

    pub fn fatal_request(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            message: message.into(),
            status: None,
            transient: false,
        }
    }

    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    pub fn clip(index: usize, reason: impl Into<String>) -> Self {
        Self::Clip {
            index,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::RequestFailed { transient, .. } => *transient,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::request_failed(format!("HTTP request timed out: {}", err), None);
        }
        let status = err.status().map(|s| s.as_u16());
        if err.is_builder() {
            return Self::fatal_request(format!("Invalid HTTP request: {}", err));
        }
        if err.is_decode() {
            return Self::fatal_request(format!("Malformed API response: {}", err));
        }
        Self::request_failed(err.to_string(), status)
    }
}

/// Failures while turning model output into typed rally data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("response is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("missing required key {path}")]
    MissingKey { path: String },

    #[error("{path}: expected {expected}, found {found}")]
    WrongType {
        path: String,
        expected: String,
        found: String,
    },

    #[error("{path}: {detail}")]
    OutOfRange { path: String, detail: String },

    #[error("{path}: {detail}")]
    Inconsistent { path: String, detail: String },

    #[error("response did not match the expected structure: {0}")]
    Shape(String),
}
