//! Cutting the source video into one clip per rally window.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info, warn};

use crate::badminton::RallyWindow;
use crate::error::{AnalyzerError, Result};
use crate::video::{VideoInfo, VideoProcessor};

/// Largest accepted difference between a clip's length and its window
pub const CLIP_DURATION_TOLERANCE_SECS: f64 = 0.1;

/// File name of the clip for the 1-based rally `index`
pub fn segment_file_name(index: usize) -> String {
    format!("segment_{:03}.mp4", index)
}

/// Something that can probe videos and cut sub-clips out of them
#[async_trait]
pub trait ClipBackend: Send + Sync {
    /// Length of a video in seconds
    async fn duration(&self, path: &Path) -> Result<f64>;

    /// Resolution, frame rate and container format of a video
    async fn probe(&self, path: &Path) -> Result<VideoInfo>;

    /// Write `duration` seconds of `source` starting at `start` to `output`,
    /// returning the duration of the clip actually produced
    async fn cut(&self, source: &Path, output: &Path, start: f64, duration: f64) -> Result<f64>;
}

/// Re-encodes with ffmpeg (libx264/aac) for frame-accurate cuts
pub struct FfmpegBackend {
    processor: VideoProcessor,
}

impl FfmpegBackend {
    pub fn new(processor: VideoProcessor) -> Self {
        Self { processor }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new(VideoProcessor::new())
    }
}

#[async_trait]
impl ClipBackend for FfmpegBackend {
    async fn duration(&self, path: &Path) -> Result<f64> {
        self.processor.probe_duration(path).await
    }

    async fn probe(&self, path: &Path) -> Result<VideoInfo> {
        self.processor.get_video_info(path).await
    }

    async fn cut(&self, source: &Path, output: &Path, start: f64, duration: f64) -> Result<f64> {
        let output_result = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-ss"])
            .arg(format!("{:.3}", start))
            .arg("-i")
            .arg(source)
            .arg("-t")
            .arg(format!("{:.3}", duration))
            .args(["-c:v", "libx264", "-c:a", "aac", "-movflags", "+faststart"])
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(AnalyzerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("ffmpeg exited with {}: {}", output_result.status, stderr.trim()),
            )));
        }

        self.processor.probe_duration(output).await
    }
}

/// A rally clip written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentClip {
    /// 1-based position of the window in the rally list
    pub index: usize,
    pub window: Option<RallyWindow>,
    pub path: PathBuf,
    /// Measured length of the clip in seconds
    pub duration: Option<f64>,
}

pub struct SegmentSplitter {
    backend: Box<dyn ClipBackend>,
    output_dir: PathBuf,
}

impl SegmentSplitter {
    pub fn new(backend: Box<dyn ClipBackend>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn source_duration(&self, source: &Path) -> Result<f64> {
        self.backend.duration(source).await
    }

    pub async fn source_info(&self, source: &Path) -> Result<VideoInfo> {
        self.backend.probe(source).await
    }

    /// Cut one clip per window, in window order.
    ///
    /// Each window must satisfy `0 <= start < end <= source_duration`; a window
    /// that does not, or whose cut fails, yields a `Clip` error in its slot while
    /// the remaining windows are still cut.
    pub async fn split(&self, source: &Path, source_duration: f64, windows: &[RallyWindow]) -> Result<Vec<Result<SegmentClip>>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        info!("✂️ Splitting {} into {} rallies", source.display(), windows.len());

        let mut results = Vec::with_capacity(windows.len());
        for (i, window) in windows.iter().enumerate() {
            let index = i + 1;
            let result = self.cut_one(source, source_duration, index, *window).await;
            if let Err(e) = &result {
                warn!(segment = index, "{}", e);
            }
            results.push(result);
        }

        let produced = results.iter().filter(|r| r.is_ok()).count();
        info!("✅ Produced {}/{} clips in {}", produced, windows.len(), self.output_dir.display());
        Ok(results)
    }

    async fn cut_one(&self, source: &Path, source_duration: f64, index: usize, window: RallyWindow) -> Result<SegmentClip> {
        if !(window.start >= 0.0 && window.start < window.end && window.end <= source_duration) {
            return Err(AnalyzerError::clip(
                index,
                format!(
                    "window {:.2}s..{:.2}s is outside the {:.2}s source",
                    window.start, window.end, source_duration
                ),
            ));
        }

        let path = self.output_dir.join(segment_file_name(index));
        let expected = window.duration();

        let produced = self
            .backend
            .cut(source, &path, window.start, expected)
            .await
            .map_err(|e| AnalyzerError::clip(index, e.to_string()))?;

        if (produced - expected).abs() > CLIP_DURATION_TOLERANCE_SECS {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!("Could not remove rejected clip {}: {}", path.display(), e);
            }
            return Err(AnalyzerError::clip(
                index,
                format!("clip lasts {:.3}s but the window is {:.3}s", produced, expected),
            ));
        }

        debug!(segment = index, "Saved {} ({})", path.display(), window.label());
        Ok(SegmentClip {
            index,
            window: Some(window),
            path,
            duration: Some(produced),
        })
    }
}
