//! HTTP surface for inkread.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /health` – Liveness plus the credential router snapshot.
//! - `GET /api-status` – Credential router snapshot for monitoring.
//! - `POST /test-api` – Send a short prompt upstream to verify the active credential.
//! - `POST /upload-files` – Multipart upload; validates the batch and returns a `session_id`.
//! - `GET /file-limits` – Upload limits for clients.
//! - `POST /extract-text` – Run sequential extraction over a session.
//! - `GET /session/:session_id` / `DELETE /session/:session_id` – Inspect or drop a session.
//! - `GET /storage-stats` – Session store counters.
//! - `GET /metrics` – Extraction counters.
//! - `POST /summarize`, `POST /translate`, `POST /qa` – Text transforms over extracted text.

use crate::service::InkreadApi;
use crate::transforms::TransformError;
use crate::upload::{UploadError, UploadedFile};
use crate::upstream::UpstreamError;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Headroom on top of the largest allowed batch for multipart framing.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the HTTP router exposing the extraction API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: InkreadApi + 'static,
{
    let limits = service.upload_limits();
    let body_limit = limits.max_file_size_mb * 1024 * 1024 * limits.max_images.max(1)
        + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::<S>))
        .route("/api-status", get(api_status::<S>))
        .route("/test-api", post(test_api::<S>))
        .route("/upload-files", post(upload_files::<S>))
        .route("/file-limits", get(file_limits::<S>))
        .route("/extract-text", post(extract_text::<S>))
        .route(
            "/session/:session_id",
            get(session_info::<S>).delete(delete_session::<S>),
        )
        .route("/storage-stats", get(storage_stats::<S>))
        .route("/metrics", get(metrics::<S>))
        .route("/summarize", post(summarize::<S>))
        .route("/translate", post(translate::<S>))
        .route("/qa", post(answer::<S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// Success envelope: `{ "success": true, ...payload }`.
#[derive(Serialize)]
struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

impl<T: Serialize> Success<T> {
    fn new(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

async fn health<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: InkreadApi,
{
    let status = service.router_status();
    Json(json!({
        "ok": status.healthy,
        "version": env!("CARGO_PKG_VERSION"),
        "api_status": status,
    }))
}

async fn api_status<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: InkreadApi,
{
    Json(service.router_status())
}

async fn test_api<S>(State(service): State<Arc<S>>) -> Result<impl IntoResponse, AppError>
where
    S: InkreadApi,
{
    let test_response = service.probe().await?;
    Ok(Success::new(json!({
        "message": "The AI is ready to help with your homework!",
        "test_response": test_response,
        "api_status": service.router_status(),
    })))
}

/// Collect every file part of the multipart body, in order, and hand the batch to the service.
async fn upload_files<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError>
where
    S: InkreadApi,
{
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(error.to_string()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|error| AppError::BadRequest(error.to_string()))?;
        files.push(UploadedFile::new(filename, content_type, data));
    }

    tracing::info!(files = files.len(), "Upload request received");
    let receipt = service.upload(files).await?;
    Ok(Success::new(receipt))
}

async fn file_limits<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: InkreadApi,
{
    let limits = service.upload_limits();
    Json(json!({
        "message": format!(
            "I can read up to {} images or PDF pages at a time to help with your homework!",
            limits.max_images
        ),
        "limits": limits,
    }))
}

/// Request body for `POST /extract-text`.
#[derive(Deserialize)]
struct ExtractRequest {
    session_id: String,
    #[serde(default, alias = "is_handwritten")]
    handwritten: bool,
}

async fn extract_text<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ExtractRequest>,
) -> impl IntoResponse
where
    S: InkreadApi,
{
    tracing::info!(
        session_id = %request.session_id,
        handwritten = request.handwritten,
        "Extraction request received"
    );
    Json(service.extract(&request.session_id, request.handwritten).await)
}

async fn session_info<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse
where
    S: InkreadApi,
{
    let info = service.session_info(&session_id);
    Json(json!({ "session_id": session_id, "info": info }))
}

async fn delete_session<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: InkreadApi,
{
    if !service.delete_session(&session_id) {
        return Err(AppError::NotFound(format!("session {session_id} not found")));
    }
    Ok(Success::new(json!({ "session_id": session_id })))
}

async fn storage_stats<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: InkreadApi,
{
    Json(service.storage_stats())
}

async fn metrics<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: InkreadApi,
{
    Json(service.metrics_snapshot())
}

fn default_grade() -> String {
    "7".to_string()
}

/// Request body for `POST /summarize`.
#[derive(Deserialize)]
struct SummarizeRequest {
    text: String,
    #[serde(default = "default_grade", alias = "classLevel")]
    class_level: String,
}

async fn summarize<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SummarizeRequest>,
) -> Result<impl IntoResponse, AppError>
where
    S: InkreadApi,
{
    let summary = service
        .summarize(&request.text, &request.class_level)
        .await?;
    Ok(Success::new(summary))
}

/// Request body for `POST /translate`.
#[derive(Deserialize)]
struct TranslateRequest {
    text: String,
    #[serde(alias = "targetLang")]
    target_language: String,
}

async fn translate<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<TranslateRequest>,
) -> Result<impl IntoResponse, AppError>
where
    S: InkreadApi,
{
    let translation = service
        .translate(&request.text, &request.target_language)
        .await?;
    Ok(Success::new(translation))
}

/// Request body for `POST /qa`.
#[derive(Deserialize)]
struct QuestionRequest {
    text: String,
    question: String,
}

async fn answer<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError>
where
    S: InkreadApi,
{
    let answer = service.answer(&request.text, &request.question).await?;
    Ok(Success::new(answer))
}

enum AppError {
    Upload(UploadError),
    Transform(TransformError),
    Upstream(UpstreamError),
    BadRequest(String),
    NotFound(String),
}

fn upstream_status(error: &UpstreamError) -> StatusCode {
    match error {
        UpstreamError::NoCredentials => StatusCode::SERVICE_UNAVAILABLE,
        UpstreamError::BothExhaustedRateLimit => StatusCode::TOO_MANY_REQUESTS,
        UpstreamError::BothExhaustedAuth | UpstreamError::Upstream(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, suggestions) = match self {
            Self::Upload(error) => {
                let status = match &error {
                    UploadError::Session(_) | UploadError::Worker(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, error.title(), error.to_string(), error.suggestions())
            }
            Self::Transform(TransformError::Upstream(error)) | Self::Upstream(error) => (
                upstream_status(&error),
                error.code(),
                error.to_string(),
                vec!["Please try again in a moment".to_string()],
            ),
            Self::Transform(error) => (
                StatusCode::BAD_REQUEST,
                "invalid_input",
                error.to_string(),
                vec!["Make sure you've extracted text from your files first".to_string()],
            ),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                message,
                Vec::new(),
            ),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message, Vec::new()),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, code, message = %message, "Request failed");
        } else {
            tracing::warn!(status = %status, code, message = %message, "Request rejected");
        }

        let body = Json(json!({
            "success": false,
            "error": code,
            "message": message,
            "suggestions": suggestions,
        }));
        (status, body).into_response()
    }
}

impl From<UploadError> for AppError {
    fn from(inner: UploadError) -> Self {
        Self::Upload(inner)
    }
}

impl From<TransformError> for AppError {
    fn from(inner: TransformError) -> Self {
        Self::Transform(inner)
    }
}

impl From<UpstreamError> for AppError {
    fn from(inner: UpstreamError) -> Self {
        Self::Upstream(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::{Classification, PipelineOutcome};
    use crate::service::InkreadApi;
    use crate::session::{SessionInfo, StorageStats};
    use crate::transforms::{Answer, Summary, TransformError, Translation};
    use crate::upload::{UploadError, UploadLimits, UploadReceipt, UploadedFile};
    use crate::upstream::{CredentialState, RequestCounters, RouterStatus, UpstreamError};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubService {
        extract_calls: Mutex<Vec<(String, bool)>>,
        uploads: Mutex<Vec<Vec<UploadedFile>>>,
        rate_limited: bool,
    }

    fn status() -> RouterStatus {
        RouterStatus {
            primary_configured: true,
            backup_configured: false,
            using_backup: false,
            active_slot: None,
            primary_state: CredentialState::Active,
            backup_state: CredentialState::Unconfigured,
            failover_count: 0,
            last_failover_at: None,
            primary_retry_at: None,
            request_counters: RequestCounters::default(),
            healthy: true,
        }
    }

    #[async_trait]
    impl InkreadApi for StubService {
        fn router_status(&self) -> RouterStatus {
            status()
        }

        async fn probe(&self) -> Result<String, UpstreamError> {
            Ok("Hello!".into())
        }

        async fn upload(&self, files: Vec<UploadedFile>) -> Result<UploadReceipt, UploadError> {
            if files.is_empty() {
                return Err(UploadError::NoFiles);
            }
            let total_images = files.len();
            self.uploads.lock().await.push(files);
            Ok(UploadReceipt {
                session_id: "session-1".into(),
                message: "ok".into(),
                processed_files: Vec::new(),
                total_images,
                suggestions: Vec::new(),
            })
        }

        fn upload_limits(&self) -> UploadLimits {
            UploadLimits::default()
        }

        async fn extract(&self, session_id: &str, handwritten: bool) -> PipelineOutcome {
            self.extract_calls
                .lock()
                .await
                .push((session_id.to_string(), handwritten));
            PipelineOutcome {
                success: true,
                classification: Classification::FullSuccess,
                message: "done".into(),
                suggestions: Vec::new(),
                error_details: None,
                session_id: session_id.to_string(),
                total_files_processed: 1,
                combined_text: "cat".into(),
                items: Vec::new(),
                total_duration_seconds: 0.1,
            }
        }

        fn session_info(&self, _session_id: &str) -> SessionInfo {
            SessionInfo {
                exists: false,
                total_items: 0,
                content_kinds: Vec::new(),
                created_at: None,
            }
        }

        fn delete_session(&self, session_id: &str) -> bool {
            session_id == "known"
        }

        fn storage_stats(&self) -> StorageStats {
            StorageStats {
                total_sessions: 2,
                total_items: 5,
                cleanup_interval_hours: 1.0,
            }
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                runs: 4,
                full_success: 3,
                partial_success: 0,
                failures: 1,
                missing_sessions: 1,
                items_succeeded: 6,
                items_failed: 0,
            }
        }

        async fn summarize(&self, text: &str, grade_level: &str) -> Result<Summary, TransformError> {
            if self.rate_limited {
                return Err(UpstreamError::BothExhaustedRateLimit.into());
            }
            if text.trim().is_empty() {
                return Err(TransformError::EmptyText);
            }
            Ok(Summary {
                summary: "short".into(),
                grade_level: grade_level.to_string(),
                original_length: text.len(),
                summary_length: 5,
            })
        }

        async fn translate(
            &self,
            text: &str,
            target_language: &str,
        ) -> Result<Translation, TransformError> {
            Ok(Translation {
                translation: "hola".into(),
                target_language: target_language.to_string(),
                original_length: text.len(),
                translation_length: 4,
            })
        }

        async fn answer(&self, text: &str, question: &str) -> Result<Answer, TransformError> {
            Ok(Answer {
                answer: "42".into(),
                question: question.to_string(),
                content_length: text.len(),
            })
        }
    }

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("router response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    fn json_request(method: Method, uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn health_reports_router_state() {
        let app = create_router(Arc::new(StubService::default()));
        let (status, json) = send(app, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        assert_eq!(json["api_status"]["primary_state"], "active");
    }

    #[tokio::test]
    async fn extract_accepts_legacy_handwritten_flag() {
        let service = Arc::new(StubService::default());
        let app = create_router(service.clone());
        let (status, json) = send(
            app,
            json_request(
                Method::POST,
                "/extract-text",
                json!({ "session_id": "abc", "is_handwritten": true }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["classification"], "FULL_SUCCESS");
        assert_eq!(json["combined_text"], "cat");
        assert_eq!(
            service.extract_calls.lock().await.clone(),
            vec![("abc".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn upload_collects_file_parts_in_order() {
        let service = Arc::new(StubService::default());
        let app = create_router(service.clone());
        let body = "--XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"files\"; filename=\"a.png\"\r\n\
            Content-Type: image/png\r\n\r\n\
            AAAA\r\n\
            --XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"note\"\r\n\r\n\
            ignored\r\n\
            --XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"files\"; filename=\"b.pdf\"\r\n\
            Content-Type: application/pdf\r\n\r\n\
            %PDF\r\n\
            --XBOUNDARY--\r\n";
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload-files")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .expect("request");

        let (status, json) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["session_id"], "session-1");
        let uploads = service.uploads.lock().await;
        let names: Vec<_> = uploads[0].iter().map(|file| file.filename.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.pdf"]);
        assert_eq!(uploads[0][0].content_type.as_deref(), Some("image/png"));
        assert_eq!(&uploads[0][0].data[..], b"AAAA");
    }

    #[tokio::test]
    async fn upload_errors_map_to_bad_request() {
        let app = create_router(Arc::new(StubService::default()));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload-files")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(
                "--XBOUNDARY\r\n\
                 Content-Disposition: form-data; name=\"note\"\r\n\r\n\
                 no files here\r\n\
                 --XBOUNDARY--\r\n",
            ))
            .expect("request");

        let (status, json) = send(app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "No files to process");
    }

    #[tokio::test]
    async fn summarize_accepts_class_level_alias() {
        let app = create_router(Arc::new(StubService::default()));
        let (status, json) = send(
            app,
            json_request(
                Method::POST,
                "/summarize",
                json!({ "text": "Long text", "classLevel": "5" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["summary"], "short");
        assert_eq!(json["grade_level"], "5");
    }

    #[tokio::test]
    async fn empty_text_is_a_bad_request() {
        let app = create_router(Arc::new(StubService::default()));
        let (status, json) = send(
            app,
            json_request(Method::POST, "/summarize", json!({ "text": "  " })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_input");
    }

    #[tokio::test]
    async fn exhausted_rate_limit_maps_to_429() {
        let service = StubService {
            rate_limited: true,
            ..StubService::default()
        };
        let app = create_router(Arc::new(service));
        let (status, json) = send(
            app,
            json_request(Method::POST, "/summarize", json!({ "text": "text" })),
        )
        .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], "both_exhausted_rate_limit");
    }

    #[tokio::test]
    async fn translate_and_qa_wrap_results() {
        let app = create_router(Arc::new(StubService::default()));
        let (_, translated) = send(
            app.clone(),
            json_request(
                Method::POST,
                "/translate",
                json!({ "text": "hello", "targetLang": "Spanish" }),
            ),
        )
        .await;
        assert_eq!(translated["translation"], "hola");
        assert_eq!(translated["target_language"], "Spanish");

        let (_, answered) = send(
            app,
            json_request(
                Method::POST,
                "/qa",
                json!({ "text": "content", "question": "why?" }),
            ),
        )
        .await;
        assert_eq!(answered["answer"], "42");
    }

    #[tokio::test]
    async fn deleting_unknown_session_is_not_found() {
        let app = create_router(Arc::new(StubService::default()));
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/session/missing")
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/session/known")
            .body(Body::empty())
            .expect("request");
        let (status, json) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["session_id"], "known");
    }

    #[tokio::test]
    async fn monitoring_routes_serialize_snapshots() {
        let app = create_router(Arc::new(StubService::default()));
        let (_, stats) = send(app.clone(), get("/storage-stats")).await;
        assert_eq!(stats["total_sessions"], 2);

        let (_, metrics) = send(app.clone(), get("/metrics")).await;
        assert_eq!(metrics["runs"], 4);

        let (_, limits) = send(app.clone(), get("/file-limits")).await;
        assert_eq!(limits["limits"]["max_images"], 5);

        let (_, session) = send(app, get("/session/abc")).await;
        assert_eq!(session["session_id"], "abc");
        assert_eq!(session["info"]["exists"], false);
    }
}
