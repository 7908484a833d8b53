use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::badminton::{MatchSummary, MatchSummaryBuilder, RallyAnalysis, SegmentStage};
use crate::error::AnalyzerError;
use crate::llm::prompts::{PromptRegistry, TaskKind};
use crate::llm::readiness::ReadinessGate;
use crate::llm::session::InferenceSession;
use crate::splitter::SegmentClip;
use crate::validation::decode_rally_analysis;

/// Why one segment could not be analyzed
#[derive(Debug)]
pub struct SegmentFailure {
    pub stage: SegmentStage,
    pub error: AnalyzerError,
}

impl SegmentFailure {
    fn at(stage: SegmentStage, error: AnalyzerError) -> Self {
        let stage = if matches!(error, AnalyzerError::Cancelled) {
            SegmentStage::Cancelled
        } else {
            stage
        };
        Self { stage, error }
    }
}

/// Runs the Analyze flow for every rally clip and merges the results by index
pub struct MatchAnalyzer {
    gate: Arc<ReadinessGate>,
    session: Arc<InferenceSession>,
    registry: Arc<PromptRegistry>,
    max_concurrent: usize,
    delete_remote: bool,
}

impl MatchAnalyzer {
    pub fn new(gate: Arc<ReadinessGate>, session: Arc<InferenceSession>, registry: Arc<PromptRegistry>) -> Self {
        Self {
            gate,
            session,
            registry,
            max_concurrent: 1,
            delete_remote: true,
        }
    }

    /// Segments analyzed at once; 1 keeps strict index order
    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_remote_cleanup(mut self, delete_remote: bool) -> Self {
        self.delete_remote = delete_remote;
        self
    }

    /// Upload, wait, request and decode the analysis of one clip
    pub async fn analyze_clip(&self, clip: &SegmentClip, cancel: &CancellationToken) -> Result<RallyAnalysis, SegmentFailure> {
        if cancel.is_cancelled() {
            return Err(SegmentFailure::at(SegmentStage::Cancelled, AnalyzerError::Cancelled));
        }

        let handle = self
            .gate
            .submit(&clip.path)
            .await
            .map_err(|e| SegmentFailure::at(SegmentStage::Upload, e))?;

        let name = handle.name.clone();
        let ready = match self.gate.await_ready(handle, cancel).await {
            Ok(ready) => ready,
            Err(e) => {
                if self.delete_remote {
                    self.gate.release_by_name(&name).await;
                }
                return Err(SegmentFailure::at(SegmentStage::Readiness, e));
            }
        };

        let task = self.registry.config(TaskKind::Analyze);
        let raw = self.session.request(&ready, task, cancel).await;
        if self.delete_remote {
            self.gate.release(&ready).await;
        }
        let raw = raw.map_err(|e| SegmentFailure::at(SegmentStage::Inference, e))?;

        decode_rally_analysis(&raw, &task.output_schema, clip.duration)
            .map_err(|e| SegmentFailure::at(SegmentStage::Decode, e.into()))
    }

    /// Analyze every clip into `builder`. A failing segment is recorded with
    /// its stage and reason; the others are unaffected.
    pub async fn analyze_into(&self, builder: &mut MatchSummaryBuilder, clips: &[SegmentClip], cancel: &CancellationToken) {
        let started = Instant::now();
        let total = clips.len();
        info!("🏸 Analyzing {} rallies ({} at a time)", total, self.max_concurrent);

        let mut outcomes = stream::iter(clips.iter())
            .map(|clip| async move {
                info!(segment = clip.index, "📹 Analyzing rally {}/{}: {}", clip.index, total, clip.path.display());
                (clip, self.analyze_clip(clip, cancel).await)
            })
            .buffer_unordered(self.max_concurrent);

        while let Some((clip, outcome)) = outcomes.next().await {
            match outcome {
                Ok(analysis) => {
                    info!(segment = clip.index, "✅ Rally {} analyzed", clip.index);
                    builder.record_analysis(clip.index, clip.window, Some(clip.path.clone()), analysis);
                }
                Err(failure) => {
                    if failure.stage == SegmentStage::Cancelled {
                        warn!(segment = clip.index, "Rally {} skipped: cancelled", clip.index);
                    } else {
                        error!(segment = clip.index, stage = ?failure.stage, "❌ Rally {} failed: {}", clip.index, failure.error);
                    }
                    builder.record_failure(
                        clip.index,
                        clip.window,
                        Some(clip.path.clone()),
                        failure.stage,
                        failure.error.to_string(),
                    );
                }
            }
        }

        info!("Analyzed {} rallies in {:.1}s", total, started.elapsed().as_secs_f64());
    }

    pub async fn analyze_match(&self, clips: &[SegmentClip], cancel: &CancellationToken) -> MatchSummary {
        let mut builder = MatchSummaryBuilder::new();
        self.analyze_into(&mut builder, clips, cancel).await;
        builder.finish()
    }
}
