use badminton_analyzer_rust::config::GeminiConfig;
use badminton_analyzer_rust::llm::gemini::GeminiProvider;
use badminton_analyzer_rust::llm::prompts::{task_config, TaskKind};
use badminton_analyzer_rust::llm::{GenerateRequest, MediaModel};
use badminton_analyzer_rust::{AnalyzerError, FileState, RemoteMediaHandle};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> GeminiProvider {
    GeminiProvider::new(GeminiConfig {
        api_key: Some("test-key".to_string()),
        base_url: server.uri(),
        ..GeminiConfig::default()
    })
    .unwrap()
}

fn active_handle() -> RemoteMediaHandle {
    RemoteMediaHandle {
        name: "files/abc".to_string(),
        uri: "https://generativelanguage.googleapis.com/v1beta/files/abc".to_string(),
        mime_type: "video/mp4".to_string(),
        state: FileState::Active,
    }
}

fn analyze_request() -> GenerateRequest {
    let task = task_config(TaskKind::Analyze);
    GenerateRequest {
        system_instruction: task.system_instruction,
        prompt: task.prompt,
        media: Some(active_handle()),
        response_schema: Some(task.output_schema),
        sampling: task.sampling,
    }
}

fn candidate(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"totalTokenCount": 321}
    })
}

#[tokio::test]
async fn test_resumable_upload() {
    let server = MockServer::start().await;
    let session_url = format!("{}/upload-session/abc", server.uri());

    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(header("x-goog-api-key", "test-key"))
        .and(header("X-Goog-Upload-Protocol", "resumable"))
        .and(header("X-Goog-Upload-Header-Content-Type", "video/mp4"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", session_url.as_str()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload-session/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file": {
                "name": "files/abc",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc",
                "mimeType": "video/mp4",
                "state": "PROCESSING"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let video = dir.path().join("match.mp4");
    tokio::fs::write(&video, b"not really a video").await.unwrap();

    let handle = provider(&server).upload_file(&video, "video/mp4").await.unwrap();

    assert_eq!(handle.name, "files/abc");
    assert_eq!(handle.state, FileState::Processing);
    assert!(!handle.is_ready());

    let requests = server.received_requests().await.unwrap();
    let start: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(start["file"]["display_name"], "match.mp4");
    assert_eq!(requests[1].body, b"not really a video".to_vec());
}

#[tokio::test]
async fn test_get_file_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "files/abc",
            "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc",
            "mimeType": "video/mp4",
            "state": "ACTIVE"
        })))
        .mount(&server)
        .await;

    let handle = tokio_test::assert_ok!(provider(&server).get_file("files/abc").await);
    assert!(handle.is_ready());
}

#[tokio::test]
async fn test_delete_file() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1beta/files/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    tokio_test::assert_ok!(provider(&server).delete_file("files/abc").await);
}

#[tokio::test]
async fn test_missing_file_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "File files/gone not found.", "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;

    let err = tokio_test::assert_err!(provider(&server).get_file("files/gone").await);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_generate_sends_media_schema_and_sampling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate("{\"rallies\": []}")))
        .mount(&server)
        .await;

    let response = provider(&server).generate(&analyze_request()).await.unwrap();
    assert_eq!(response.content, "{\"rallies\": []}");
    assert_eq!(response.tokens_used, Some(321));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();

    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["fileData"]["fileUri"], active_handle().uri);
    assert_eq!(parts[0]["fileData"]["mimeType"], "video/mp4");
    assert!(parts[1]["text"].as_str().unwrap().contains("won the point"));

    let generation = &body["generationConfig"];
    assert_eq!(generation["responseMimeType"], "application/json");
    assert_eq!(generation["topK"], 64);
    assert_eq!(generation["responseSchema"]["properties"]["Stamina"]["type"], "OBJECT");
    assert!(body["systemInstruction"]["parts"][0]["text"].is_string());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&analyze_request()).await.unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("The model is overloaded."));
}

#[tokio::test]
async fn test_client_error_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&analyze_request()).await.unwrap_err();
    assert!(matches!(err, AnalyzerError::RequestFailed { status: Some(400), transient: false, .. }));
}

#[tokio::test]
async fn test_blocked_prompt_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&analyze_request()).await.unwrap_err();
    assert!(!err.is_transient());
    assert!(err.to_string().contains("SAFETY"));
}

#[tokio::test]
async fn test_availability_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models/gemini-1.5-flash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "models/gemini-1.5-flash"})))
        .mount(&server)
        .await;

    let model = provider(&server);
    assert!(model.is_available().await);
    assert_eq!(model.model_name(), "gemini-1.5-flash");
}
