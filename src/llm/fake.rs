//! Scripted in-memory `MediaModel` used by unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::{FileState, GenerateRequest, LLMResponse, MediaModel, RemoteMediaHandle};
use crate::error::{AnalyzerError, Result};

/// What the fake answers to one generate call
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Status(u16),
    Hang,
}

#[derive(Default)]
pub struct FakeModel {
    poll_script: Vec<FileState>,
    polls: Mutex<HashMap<String, VecDeque<FileState>>>,
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    default_reply: Option<Reply>,
    failing_uploads: HashSet<String>,
    status_failures: Mutex<VecDeque<u16>>,
    pub uploads: Mutex<Vec<PathBuf>>,
    pub deleted: Mutex<Vec<String>>,
    pub generate_calls: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// States returned by successive `get_file` calls for every uploaded file;
    /// `ACTIVE` once the script runs out
    pub fn with_poll_states(mut self, states: Vec<FileState>) -> Self {
        self.poll_script = states;
        self
    }

    /// Queue a reply for requests about the file with this stem
    pub fn with_reply(self, stem: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(stem.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply used whenever no queued reply exists
    pub fn with_default_reply(mut self, reply: Reply) -> Self {
        self.default_reply = Some(reply);
        self
    }

    /// HTTP statuses returned by the next `get_file` calls, before any poll state
    pub fn with_status_failures(self, codes: Vec<u16>) -> Self {
        self.status_failures.lock().unwrap().extend(codes);
        self
    }

    pub fn fail_upload(mut self, stem: &str) -> Self {
        self.failing_uploads.insert(stem.to_string());
        self
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.lock().unwrap().len()
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl MediaModel for FakeModel {
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteMediaHandle> {
        let stem = stem_of(path);
        if self.failing_uploads.contains(&stem) {
            return Err(AnalyzerError::request_failed(format!("upload of {} rejected", stem), Some(400)));
        }
        self.uploads.lock().unwrap().push(path.to_path_buf());

        let name = format!("files/{}", stem);
        self.polls
            .lock()
            .unwrap()
            .insert(name.clone(), self.poll_script.iter().copied().collect());

        Ok(RemoteMediaHandle {
            name,
            uri: format!("fake://{}", stem),
            mime_type: mime_type.to_string(),
            state: FileState::Processing,
        })
    }

    async fn get_file(&self, name: &str) -> Result<RemoteMediaHandle> {
        if let Some(code) = self.status_failures.lock().unwrap().pop_front() {
            return Err(AnalyzerError::request_failed(format!("fake status {}", code), Some(code)));
        }
        let state = self
            .polls
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(|script| script.pop_front())
            .unwrap_or(FileState::Active);
        let stem = name.trim_start_matches("files/");

        Ok(RemoteMediaHandle {
            name: name.to_string(),
            uri: format!("fake://{}", stem),
            mime_type: "video/mp4".to_string(),
            state,
        })
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<LLMResponse> {
        let stem = request
            .media
            .as_ref()
            .map(|m| m.uri.trim_start_matches("fake://").to_string())
            .unwrap_or_default();
        self.generate_calls.lock().unwrap().push(stem.clone());

        let queued = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&stem)
            .and_then(|queue| queue.pop_front());
        let reply = queued
            .or_else(|| self.default_reply.clone())
            .unwrap_or(Reply::Status(500));

        match reply {
            Reply::Text(content) => Ok(LLMResponse {
                content,
                tokens_used: Some(42),
            }),
            Reply::Status(code) => Err(AnalyzerError::request_failed(format!("fake status {}", code), Some(code))),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(AnalyzerError::fatal_request("hung request returned"))
            }
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}
