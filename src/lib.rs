/// Badminton Rally Analyzer - Rust Implementation
///
/// Sends badminton match videos to Gemini to segment them into rallies and
/// analyze each rally, validates the structured JSON it returns, cuts the
/// match into per-rally clips and aggregates the analyses into a match summary.

pub mod badminton;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod processing;
pub mod retry;
pub mod splitter;
pub mod validation;
pub mod video;

// Re-export main types for easy access
pub use crate::badminton::{MatchSummary, RallyAnalysis, RallySegmentation, RallyWindow};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{AnalyzerError, DecodeError, Result};
pub use crate::ingest::{MediaIngestor, StagedMedia};
pub use crate::llm::prompts::{PromptRegistry, TaskConfig, TaskKind};
pub use crate::llm::readiness::ReadinessGate;
pub use crate::llm::session::InferenceSession;
pub use crate::llm::{FileState, MediaModel, RemoteMediaHandle};
pub use crate::pipeline::{AnalysisPipeline, AnalysisReport, WindowSource};
pub use crate::processing::MatchAnalyzer;
pub use crate::splitter::{ClipBackend, FfmpegBackend, SegmentClip, SegmentSplitter};
pub use crate::video::{VideoInfo, VideoProcessor};
