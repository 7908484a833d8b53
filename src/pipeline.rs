//! End-to-end flow: ingest, detect or accept rally windows, split, analyze, report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::badminton::{MatchSummary, MatchSummaryBuilder, RallySegmentation, RallyWindow, SegmentStage};
use crate::config::Config;
use crate::error::{AnalyzerError, Result};
use crate::ingest::{MediaIngestor, StagedMedia};
use crate::llm::prompts::{PromptRegistry, TaskKind};
use crate::llm::readiness::ReadinessGate;
use crate::llm::session::InferenceSession;
use crate::llm::{create_model, MediaModel};
use crate::processing::MatchAnalyzer;
use crate::splitter::{ClipBackend, FfmpegBackend, SegmentClip, SegmentSplitter};
use crate::validation::decode_segmentation;
use crate::video::{VideoInfo, VideoProcessor};

/// Where the rally windows of a run come from
#[derive(Debug, Clone)]
pub enum WindowSource {
    /// Windows supplied by the caller, e.g. from a windows file
    Fixed(Vec<RallyWindow>),
    /// Ask the model to segment the video
    Detect,
}

/// Everything a run produced, written as JSON to the output directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub source: PathBuf,
    pub source_md5: Option<String>,
    pub source_duration_secs: Option<f64>,
    /// Resolution, frame rate and format, when ffprobe could read them
    pub source_info: Option<VideoInfo>,
    pub windows: Vec<RallyWindow>,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub summary: MatchSummary,
}

pub struct AnalysisPipeline {
    config: Config,
    ingestor: MediaIngestor,
    processor: VideoProcessor,
    gate: Arc<ReadinessGate>,
    session: Arc<InferenceSession>,
    registry: Arc<PromptRegistry>,
    splitter: SegmentSplitter,
    analyzer: MatchAnalyzer,
}

impl AnalysisPipeline {
    /// Pipeline talking to Gemini and cutting clips with ffmpeg
    pub async fn from_config(config: Config) -> Result<Self> {
        let model = create_model(&config.gemini)?;
        let processor = VideoProcessor::with_extensions(&config.media.supported_extensions);
        Self::new(config, model, Box::new(FfmpegBackend::new(processor))).await
    }

    pub async fn new(config: Config, model: Arc<dyn MediaModel>, backend: Box<dyn ClipBackend>) -> Result<Self> {
        config.validate()?;

        let processor = VideoProcessor::with_extensions(&config.media.supported_extensions);
        let registry = Arc::new(
            PromptRegistry::from_config(&config.prompts)
                .await
                .with_max_output_tokens(config.gemini.max_output_tokens),
        );
        let gate = Arc::new(
            ReadinessGate::from_config(model.clone(), &config.polling)
                .with_retry(config.retry.to_retry_config("upload")),
        );
        let session = Arc::new(InferenceSession::new(
            model,
            std::time::Duration::from_secs(config.gemini.request_timeout_seconds),
            config.retry.to_retry_config("generate"),
        ));
        let analyzer = MatchAnalyzer::new(gate.clone(), session.clone(), registry.clone())
            .with_concurrency(config.processing.max_concurrent_segments)
            .with_remote_cleanup(config.processing.delete_remote_files);

        Ok(Self {
            ingestor: MediaIngestor::new(&config.media.media_dir, processor.clone()),
            splitter: SegmentSplitter::new(backend, &config.media.segments_dir),
            processor,
            gate,
            session,
            registry,
            analyzer,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Full run over one match video.
    ///
    /// Ingestion, probing and rally detection failures end the run. Failed
    /// cuts and failed rally analyses are recorded in the summary instead.
    pub async fn run(&self, source: &Path, windows: WindowSource, cancel: &CancellationToken) -> Result<AnalysisReport> {
        let staged = self.ingestor.ingest(source).await?;
        let result = self.run_staged(&staged, windows, cancel).await;

        if self.config.media.cleanup_staged {
            self.ingestor.release(&staged).await;
        }

        let report = result?;
        self.write_report(&report).await?;
        Ok(report)
    }

    async fn run_staged(&self, staged: &StagedMedia, windows: WindowSource, cancel: &CancellationToken) -> Result<AnalysisReport> {
        let duration = self.splitter.source_duration(&staged.path).await?;
        info!("🎬 {} lasts {:.1}s", staged.path.display(), duration);
        let source_info = match self.splitter.source_info(&staged.path).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Stream details of {} unavailable: {}", staged.path.display(), e);
                None
            }
        };

        let windows = match windows {
            WindowSource::Fixed(rallies) => {
                let segmentation = RallySegmentation { rallies };
                segmentation.validate()?;
                segmentation.rallies
            }
            WindowSource::Detect => self.detect_rallies(&staged.path, cancel).await?,
        };

        let mut builder = MatchSummaryBuilder::new();
        let clips = self.split_into(&mut builder, &staged.path, duration, &windows).await?;
        self.analyzer.analyze_into(&mut builder, &clips, cancel).await;

        if self.config.media.cleanup_segments {
            remove_clips(&clips).await;
        }

        Ok(AnalysisReport {
            source: staged.original.clone(),
            source_md5: Some(staged.md5.clone()),
            source_duration_secs: Some(duration),
            source_info,
            windows,
            model: self.session.model_name().to_string(),
            generated_at: Utc::now(),
            summary: builder.finish(),
        })
    }

    /// Ask the model for the rally windows of a video
    pub async fn detect_rallies(&self, video: &Path, cancel: &CancellationToken) -> Result<Vec<RallyWindow>> {
        info!("🔍 Detecting rallies in {}", video.display());

        let handle = self.gate.submit_and_wait(video, cancel).await?;
        let task = self.registry.config(TaskKind::Segment);
        let raw = self.session.request(&handle, task, cancel).await;
        if self.config.processing.delete_remote_files {
            self.gate.release(&handle).await;
        }

        let raw = raw?;
        let segmentation = decode_segmentation(&raw, &task.output_schema).map_err(|e| {
            warn!(file = %handle.name, "Segmentation response rejected: {}", e);
            AnalyzerError::from(e)
        })?;

        info!("🏸 Detected {} rallies", segmentation.rallies.len());
        Ok(segmentation.rallies)
    }

    /// Ingest a video and return its detected rally windows
    pub async fn segment(&self, source: &Path, cancel: &CancellationToken) -> Result<RallySegmentation> {
        let staged = self.ingestor.ingest(source).await?;
        let rallies = self.detect_rallies(&staged.path, cancel).await;
        if self.config.media.cleanup_staged {
            self.ingestor.release(&staged).await;
        }
        Ok(RallySegmentation { rallies: rallies? })
    }

    /// Cut a video into rally clips without analyzing them
    pub async fn split(&self, source: &Path, windows: &[RallyWindow]) -> Result<Vec<Result<SegmentClip>>> {
        RallySegmentation {
            rallies: windows.to_vec(),
        }
        .validate()?;
        let duration = self.splitter.source_duration(source).await?;
        self.splitter.split(source, duration, windows).await
    }

    async fn split_into(
        &self,
        builder: &mut MatchSummaryBuilder,
        source: &Path,
        duration: f64,
        windows: &[RallyWindow],
    ) -> Result<Vec<SegmentClip>> {
        let results = self.splitter.split(source, duration, windows).await?;
        let mut clips = Vec::with_capacity(results.len());

        for (i, (result, window)) in results.into_iter().zip(windows).enumerate() {
            match result {
                Ok(clip) => clips.push(clip),
                Err(e) => builder.record_failure(i + 1, Some(*window), None, SegmentStage::Split, e.to_string()),
            }
        }
        Ok(clips)
    }

    /// Analyze clips already present in `dir`, in file name order
    pub async fn analyze_clips(&self, dir: &Path, cancel: &CancellationToken) -> Result<AnalysisReport> {
        let paths = self.processor.discover_videos(dir)?;
        if paths.is_empty() {
            return Err(AnalyzerError::Ingestion {
                path: dir.to_path_buf(),
                reason: "no video clips found".to_string(),
            });
        }

        let mut clips = Vec::with_capacity(paths.len());
        for (i, path) in paths.into_iter().enumerate() {
            let duration = match self.splitter.source_duration(&path).await {
                Ok(d) => Some(d),
                Err(e) => {
                    debug!("Analyzing {} without a known duration: {}", path.display(), e);
                    None
                }
            };
            clips.push(SegmentClip {
                index: i + 1,
                window: None,
                path,
                duration,
            });
        }

        let summary = self.analyzer.analyze_match(&clips, cancel).await;
        let report = AnalysisReport {
            source: dir.to_path_buf(),
            source_md5: None,
            source_duration_secs: None,
            source_info: None,
            windows: Vec::new(),
            model: self.session.model_name().to_string(),
            generated_at: Utc::now(),
            summary,
        };

        self.write_report(&report).await?;
        Ok(report)
    }

    /// Write the report as pretty JSON under the output directory
    pub async fn write_report(&self, report: &AnalysisReport) -> Result<PathBuf> {
        let path = self.config.report_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json_data = serde_json::to_string_pretty(report)
            .map_err(|e| AnalyzerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        tokio::fs::write(&path, json_data).await?;

        info!("💾 Report saved to: {}", path.display());
        Ok(path)
    }
}

async fn remove_clips(clips: &[SegmentClip]) {
    for clip in clips {
        if let Err(e) = tokio::fs::remove_file(&clip.path).await {
            warn!("Failed to remove clip {}: {}", clip.path.display(), e);
        }
    }
}
