use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use badminton_analyzer_rust::badminton::{RallyOutcome, SegmentStage};
use badminton_analyzer_rust::llm::{GenerateRequest, LLMResponse};
use badminton_analyzer_rust::{
    AnalysisPipeline, AnalysisReport, AnalyzerError, ClipBackend, Config, ConfigBuilder, FileState, MediaModel,
    RallyWindow, RemoteMediaHandle, Result, VideoInfo, WindowSource,
};

const SEGMENTATION: &str = r#"```json
{"rallies": [{"start": "00:01", "end": "00:09"}, {"start": "00:10.5", "end": "00:18"}]}
```"#;

fn analysis(winner: &str) -> String {
    serde_json::json!({
        "Player1": "Chen",
        "Player2": "Momota",
        "Point_winner": winner,
        "rally_shots_count": 7,
        "CourtReach": {
            "Player1": {"Description": ["Reaches the back corner"], "Timestamp": ["00:02"]},
            "Player2": {"Description": [], "Timestamp": []}
        },
        "Footwork": {
            "Player1": {"Description": ["Quick split step"], "Timestamp": ["00:01"]},
            "Player2": {"Description": ["Lunges to the net"], "Timestamp": ["00:04.5"]}
        },
        "Stamina": {
            "Player1": {"Description": "Steady", "percentage": 85},
            "Player2": {"Description": "Tiring", "percentage": 60}
        },
        "Fouls": {
            "Player1": {"Description": [], "Timestamp": []},
            "Player2": {"Description": [], "Timestamp": []}
        },
        "Smashes": {
            "Player1": {"count": 1, "Timestamp": ["00:05"]},
            "Player2": {"count": 0, "Timestamp": []}
        }
    })
    .to_string()
}

/// Answers by the stem of the uploaded file; files are ACTIVE immediately
#[derive(Default)]
struct ScriptedModel {
    replies: HashMap<String, Result<String>>,
    default_reply: Option<String>,
    deleted: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn reply(mut self, stem: &str, text: &str) -> Self {
        self.replies.insert(stem.to_string(), Ok(text.to_string()));
        self
    }

    fn reject(mut self, stem: &str) -> Self {
        self.replies
            .insert(stem.to_string(), Err(AnalyzerError::request_failed("invalid argument", Some(400))));
        self
    }

    fn default_reply(mut self, text: &str) -> Self {
        self.default_reply = Some(text.to_string());
        self
    }
}

fn handle(stem: &str) -> RemoteMediaHandle {
    RemoteMediaHandle {
        name: format!("files/{}", stem),
        uri: format!("test://{}", stem),
        mime_type: "video/mp4".to_string(),
        state: FileState::Active,
    }
}

#[async_trait]
impl MediaModel for ScriptedModel {
    async fn upload_file(&self, path: &Path, _mime_type: &str) -> Result<RemoteMediaHandle> {
        let stem = path.file_stem().unwrap().to_string_lossy().to_string();
        Ok(handle(&stem))
    }

    async fn get_file(&self, name: &str) -> Result<RemoteMediaHandle> {
        Ok(handle(name.trim_start_matches("files/")))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<LLMResponse> {
        let stem = request.media.as_ref().unwrap().uri.trim_start_matches("test://").to_string();
        let content = match self.replies.get(&stem) {
            Some(Ok(text)) => text.clone(),
            Some(Err(_)) => return Err(AnalyzerError::request_failed("invalid argument", Some(400))),
            None => self
                .default_reply
                .clone()
                .ok_or_else(|| AnalyzerError::fatal_request("no scripted reply"))?,
        };
        Ok(LLMResponse {
            content,
            tokens_used: None,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Source videos last 30s, clips last exactly their window
struct CopyBackend {
    cuts: Arc<Mutex<Vec<PathBuf>>>,
}

#[async_trait]
impl ClipBackend for CopyBackend {
    async fn duration(&self, path: &Path) -> Result<f64> {
        let name = path.file_name().unwrap().to_string_lossy();
        Ok(if name.starts_with("segment_") { 8.0 } else { 30.0 })
    }

    async fn probe(&self, path: &Path) -> Result<VideoInfo> {
        Ok(VideoInfo {
            path: path.to_path_buf(),
            filename: path.file_name().unwrap().to_string_lossy().to_string(),
            duration: std::time::Duration::from_secs(30),
            width: 1920,
            height: 1080,
            fps: 25.0,
            format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            file_size: 0,
            has_audio: true,
        })
    }

    async fn cut(&self, source: &Path, output: &Path, _start: f64, duration: f64) -> Result<f64> {
        tokio::fs::copy(source, output).await?;
        self.cuts.lock().unwrap().push(output.to_path_buf());
        Ok(duration)
    }
}

struct Fixture {
    dir: TempDir,
    source: PathBuf,
    config: Config,
    cuts: Arc<Mutex<Vec<PathBuf>>>,
}

impl Fixture {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("match.mp4");
        tokio::fs::write(&source, b"match video bytes").await.unwrap();

        let config = ConfigBuilder::new()
            .with_poll_interval(1)
            .with_max_wait(5)
            .with_max_retries(0)
            .with_media_dir(dir.path().join("medias"))
            .with_segments_dir(dir.path().join("video_segments"))
            .with_output_dir(dir.path().join("output"))
            .with_prompt_dir(dir.path().join("prompts"))
            .build();

        Self {
            dir,
            source,
            config,
            cuts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn pipeline(&self, model: ScriptedModel) -> AnalysisPipeline {
        let backend = CopyBackend { cuts: self.cuts.clone() };
        AnalysisPipeline::new(self.config.clone(), Arc::new(model), Box::new(backend))
            .await
            .unwrap()
    }

    async fn saved_report(&self) -> AnalysisReport {
        let json = tokio::fs::read_to_string(self.dir.path().join("output/match_report.json"))
            .await
            .unwrap();
        serde_json::from_str(&json).unwrap()
    }
}

#[tokio::test]
async fn test_detected_rallies_full_run() {
    let fixture = Fixture::new().await;
    let model = ScriptedModel::default()
        .reply("match", SEGMENTATION)
        .reply("segment_001", &analysis("Chen"))
        .reply("segment_002", &analysis("Momota"));

    let pipeline = fixture.pipeline(model).await;
    let report = pipeline
        .run(&fixture.source, WindowSource::Detect, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        report.windows,
        vec![RallyWindow { start: 1.0, end: 9.0 }, RallyWindow { start: 10.5, end: 18.0 }]
    );
    assert_eq!(report.model, "scripted");
    assert_eq!(report.source_duration_secs, Some(30.0));
    let video = report.source_info.as_ref().unwrap();
    assert_eq!((video.width, video.height), (1920, 1080));
    assert_eq!(video.fps, 25.0);
    assert_eq!(report.source_md5.as_deref().map(str::len), Some(32));

    let summary = &report.summary;
    assert_eq!(summary.rally_count, 2);
    assert_eq!(summary.player1.as_deref(), Some("Chen"));
    assert_eq!((summary.score.player1, summary.score.player2), (1, 1));
    assert_eq!(summary.rallies[0].score_after.player1, 1);
    assert_eq!(summary.rallies[1].score_after.player2, 1);
    assert_eq!(summary.stats.total_shots, 14);

    assert!(fixture.dir.path().join("video_segments/segment_001.mp4").exists());
    assert!(fixture.dir.path().join("video_segments/segment_002.mp4").exists());
    // staged copy removed after the run
    assert!(!fixture.dir.path().join("medias/match.mp4").exists());

    let saved = fixture.saved_report().await;
    assert_eq!(saved.summary, report.summary);
    assert_eq!(saved.source_info.map(|v| v.height), Some(1080));
}

#[tokio::test]
async fn test_fixed_windows_with_out_of_bounds_rally() {
    let fixture = Fixture::new().await;
    let model = ScriptedModel::default().default_reply(&analysis("Chen"));
    let windows = vec![
        RallyWindow { start: 0.0, end: 8.0 },
        RallyWindow { start: 25.0, end: 40.0 },
        RallyWindow { start: 40.0, end: 41.0 },
    ];

    let pipeline = fixture.pipeline(model).await;
    let report = pipeline
        .run(&fixture.source, WindowSource::Fixed(windows), &CancellationToken::new())
        .await
        .unwrap();

    let summary = report.summary;
    assert_eq!(summary.rally_count, 3);
    assert!(summary.rallies[0].analysis().is_some());
    for entry in &summary.rallies[1..] {
        assert!(matches!(entry.outcome, RallyOutcome::Failed { stage: SegmentStage::Split, .. }));
        assert!(entry.clip_path.is_none());
    }
    assert_eq!(summary.score.player1, 1);
    assert_eq!(fixture.cuts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_segmentation_is_fatal() {
    let fixture = Fixture::new().await;
    let model = ScriptedModel::default().reply("match", r#"{"rallies": [{"start": 5, "end": 2}]}"#);

    let pipeline = fixture.pipeline(model).await;
    let err = pipeline
        .run(&fixture.source, WindowSource::Detect, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AnalyzerError::Decode(_)));
    assert!(!fixture.dir.path().join("output/match_report.json").exists());
}

#[tokio::test]
async fn test_overlapping_fixed_windows_rejected() {
    let fixture = Fixture::new().await;
    let pipeline = fixture.pipeline(ScriptedModel::default()).await;
    let windows = vec![RallyWindow { start: 0.0, end: 8.0 }, RallyWindow { start: 5.0, end: 9.0 }];

    let err = pipeline
        .run(&fixture.source, WindowSource::Fixed(windows), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::Decode(_)));
}

#[tokio::test]
async fn test_missing_source_is_ingestion_error() {
    let fixture = Fixture::new().await;
    let pipeline = fixture.pipeline(ScriptedModel::default()).await;

    let err = pipeline
        .run(&fixture.dir.path().join("nope.mp4"), WindowSource::Detect, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::Ingestion { .. }));
}

#[tokio::test]
async fn test_analyze_existing_clips() {
    let fixture = Fixture::new().await;
    let clips_dir = fixture.dir.path().join("clips");
    tokio::fs::create_dir_all(&clips_dir).await.unwrap();
    for name in ["segment_003.mp4", "segment_001.mp4", "segment_002.mp4", "readme.txt"] {
        tokio::fs::write(clips_dir.join(name), b"clip").await.unwrap();
    }

    let model = ScriptedModel::default()
        .default_reply(&analysis("Momota"))
        .reject("segment_002");

    let pipeline = fixture.pipeline(model).await;
    let report = pipeline
        .analyze_clips(&clips_dir, &CancellationToken::new())
        .await
        .unwrap();

    let summary = &report.summary;
    assert_eq!(summary.rally_count, 3);
    assert_eq!(
        summary.rallies[1].clip_path.as_deref(),
        Some(clips_dir.join("segment_002.mp4").as_path())
    );
    assert!(matches!(
        summary.rallies[1].outcome,
        RallyOutcome::Failed { stage: SegmentStage::Inference, .. }
    ));
    assert_eq!(summary.score.player2, 2);
    assert!(report.windows.is_empty());

    let saved = fixture.saved_report().await;
    assert_eq!(saved.summary.rally_count, 3);
}

#[tokio::test]
async fn test_cancelled_run_keeps_every_rally() {
    let fixture = Fixture::new().await;
    let pipeline = fixture.pipeline(ScriptedModel::default().default_reply(&analysis("Chen"))).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let windows = vec![RallyWindow { start: 0.0, end: 8.0 }, RallyWindow { start: 9.0, end: 17.0 }];
    let report = pipeline
        .run(&fixture.source, WindowSource::Fixed(windows), &cancel)
        .await
        .unwrap();

    assert_eq!(report.summary.rally_count, 2);
    assert!(report
        .summary
        .rallies
        .iter()
        .all(|r| matches!(r.outcome, RallyOutcome::Failed { stage: SegmentStage::Cancelled, .. })));
}
