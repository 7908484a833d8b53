use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{AnalyzerError, Result};

/// Video information extracted from file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub filename: String,
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: String,
    pub file_size: u64,
    pub has_audio: bool,
}

/// MIME type sent with an upload, from the file extension
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "mp4" => Some("video/mp4"),
        "avi" => Some("video/x-msvideo"),
        "mov" => Some("video/quicktime"),
        "mkv" => Some("video/x-matroska"),
        _ => None,
    }
}

/// Video probing and discovery using ffprobe
#[derive(Clone)]
pub struct VideoProcessor {
    /// Supported video extensions
    supported_extensions: Vec<String>,
}

impl VideoProcessor {
    pub fn new() -> Self {
        Self::with_extensions(&["mp4".to_string(), "avi".to_string(), "mov".to_string(), "mkv".to_string()])
    }

    pub fn with_extensions(extensions: &[String]) -> Self {
        Self {
            supported_extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.supported_extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// Video files directly inside `dir`, sorted by file name
    pub fn discover_videos(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut videos = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| AnalyzerError::Io(e.into()))?;
            if entry.file_type().is_file() && self.is_supported(entry.path()) {
                videos.push(entry.into_path());
            }
        }

        videos.sort();
        debug!("Found {} videos in {}", videos.len(), dir.display());
        Ok(videos)
    }

    /// Extract video information using ffprobe
    pub async fn get_video_info(&self, video_path: &Path) -> Result<VideoInfo> {
        let output = tokio::process::Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(video_path)
            .output()
            .await
            .map_err(|e| probe_error(video_path, format!("cannot run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(probe_error(video_path, format!("ffprobe exited with {}", output.status)));
        }

        let ffprobe_data: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| probe_error(video_path, format!("unreadable ffprobe output: {}", e)))?;
        let file_size = tokio::fs::metadata(video_path).await?.len();

        let video_info = parse_ffprobe(video_path, &ffprobe_data, file_size)?;

        info!(
            "📹 Analyzed video: {} ({}x{}, {:.1}fps, {:.1}s)",
            video_info.filename,
            video_info.width,
            video_info.height,
            video_info.fps,
            video_info.duration.as_secs_f64()
        );

        Ok(video_info)
    }

    /// Container duration in seconds
    pub async fn probe_duration(&self, video_path: &Path) -> Result<f64> {
        let output = tokio::process::Command::new("ffprobe")
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
            .arg(video_path)
            .output()
            .await
            .map_err(|e| probe_error(video_path, format!("cannot run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(probe_error(video_path, format!("ffprobe exited with {}", output.status)));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<f64>()
            .map_err(|_| probe_error(video_path, format!("no duration in '{}'", text.trim())))
    }
}

impl Default for VideoProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn probe_error(path: &Path, reason: String) -> AnalyzerError {
    AnalyzerError::Probe {
        path: path.to_path_buf(),
        reason,
    }
}

fn parse_ffprobe(video_path: &Path, data: &serde_json::Value, file_size: u64) -> Result<VideoInfo> {
    let format = &data["format"];
    let streams = data["streams"]
        .as_array()
        .ok_or_else(|| probe_error(video_path, "no streams reported".to_string()))?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"] == "video")
        .ok_or_else(|| probe_error(video_path, "no video stream found".to_string()))?;

    let duration_seconds: f64 = format["duration"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .filter(|d: &f64| d.is_finite() && *d > 0.0)
        .ok_or_else(|| probe_error(video_path, "no usable duration".to_string()))?;

    Ok(VideoInfo {
        path: video_path.to_path_buf(),
        filename: video_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        duration: Duration::from_secs_f64(duration_seconds),
        width: video_stream["width"].as_u64().unwrap_or(0) as u32,
        height: video_stream["height"].as_u64().unwrap_or(0) as u32,
        fps: video_stream["r_frame_rate"]
            .as_str()
            .and_then(|s| {
                let parts: Vec<&str> = s.split('/').collect();
                if parts.len() == 2 {
                    let num: f64 = parts[0].parse().ok()?;
                    let den: f64 = parts[1].parse().ok()?;
                    (den != 0.0).then(|| num / den)
                } else {
                    s.parse().ok()
                }
            })
            .unwrap_or(0.0),
        format: format["format_name"].as_str().unwrap_or("unknown").to_string(),
        file_size,
        has_audio: streams.iter().any(|s| s["codec_type"] == "audio"),
    })
}
