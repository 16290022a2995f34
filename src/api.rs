//! HTTP surface for Rusty Import.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /import` – Run one import batch over uploaded files. Uploads pass the drop target
//!   checks first (allow-list, one export file per format) and the response carries the batch
//!   summary (`notes_imported`, `total_jobs`, `jobs_failed`, `discarded`, `errors`).
//! - `GET /notes` – List every note imported so far.
//! - `GET /metrics` – Observe import counters and note store totals.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! All requests share one coordinator, so a second upload while a batch is running is refused
//! with `409 Conflict`.

use crate::config::Config;
use crate::dropzone::{DropOutcome, Dropzone, DropzoneConfig, DropzoneHandler};
use crate::engines::EngineFactory;
use crate::importer::{
    BATCH_IN_PROGRESS_MESSAGE, ImportCoordinator, ImportErrorReport, ImportOptions, ImportSummary,
    SourceFile,
};
use crate::metrics::{ImportMetrics, MetricsSnapshot};
use crate::notes::{NoteStore, StoredNote};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Shared state behind the router: one coordinator writing into one store.
pub struct ImportService {
    coordinator: ImportCoordinator,
    store: Arc<NoteStore>,
    dropzone: DropzoneConfig,
}

impl ImportService {
    /// Build a service with its own store and metrics registry.
    pub fn new(options: ImportOptions, dropzone: DropzoneConfig) -> Self {
        let store = Arc::new(NoteStore::new());
        let coordinator = ImportCoordinator::new(store.clone(), options)
            .with_metrics(Arc::new(ImportMetrics::new()));
        Self {
            coordinator,
            store,
            dropzone,
        }
    }

    /// Build a service from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ImportOptions::from_config(config),
            DropzoneConfig::from_config(config),
        )
    }

    /// Replace the engines used by the coordinator.
    pub fn with_engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.coordinator = self.coordinator.with_engine_factory(factory);
        self
    }

    /// Store receiving imported notes.
    pub fn store(&self) -> &Arc<NoteStore> {
        &self.store
    }

    /// Whether a batch is running.
    pub fn is_importing(&self) -> bool {
        self.coordinator.is_importing()
    }
}

/// Build the HTTP router exposing the import API surface.
pub fn create_router(service: Arc<ImportService>) -> Router {
    Router::new()
        .route("/import", post(import_files))
        .route("/notes", get(list_notes))
        .route("/metrics", get(get_metrics))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /import` endpoint.
#[derive(Deserialize)]
struct ImportRequest {
    /// Files to import, in selection order.
    #[serde(default)]
    files: Vec<UploadedFile>,
}

#[derive(Deserialize)]
struct UploadedFile {
    name: String,
    content: String,
}

/// Success response for the `POST /import` endpoint.
#[derive(Serialize)]
struct ImportResponse {
    notes_imported: usize,
    total_jobs: usize,
    jobs_failed: usize,
    /// Export files dropped because another file of the same format was selected first.
    discarded: usize,
    errors: Vec<ImportErrorReport>,
}

#[derive(Default)]
struct Upload {
    files: Option<Vec<SourceFile>>,
}

impl DropzoneHandler for Upload {
    fn on_accept(&mut self, files: Vec<SourceFile>) {
        self.files = Some(files);
    }

    fn on_reset(&mut self) {
        self.files = None;
    }
}

/// Import the uploaded files and wait for the batch to finish.
async fn import_files(
    State(service): State<Arc<ImportService>>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    let files: Vec<SourceFile> = request
        .files
        .into_iter()
        .map(|file| SourceFile::from_bytes(file.name, file.content))
        .collect();

    let mut dropped = 0;
    let selection = if files.is_empty() {
        Some(files)
    } else {
        let mut dropzone = Dropzone::new(service.dropzone.clone());
        let mut upload = Upload::default();
        match dropzone.drop_files(files, Instant::now(), &mut upload) {
            DropOutcome::Rejected(message) => {
                tracing::info!(reason = message, "Upload rejected");
                return Err(ApiError::Rejected(message.to_string()));
            }
            DropOutcome::Accepted { discarded, .. } => dropped = discarded,
            DropOutcome::Ignored => {}
        }
        upload.files
    };

    let summary = service.coordinator.import_notes(selection).wait().await;
    if !summary.completed {
        return Err(ApiError::from_summary(summary));
    }
    tracing::info!(
        notes_imported = summary.notes_imported,
        total_jobs = summary.total_jobs,
        jobs_failed = summary.jobs_failed,
        "Import request completed"
    );
    Ok(Json(ImportResponse {
        notes_imported: summary.notes_imported,
        total_jobs: summary.total_jobs,
        jobs_failed: summary.jobs_failed,
        discarded: summary.discarded + dropped,
        errors: summary.errors,
    }))
}

/// Response body for `GET /notes`.
#[derive(Serialize)]
struct NotesResponse {
    notes: Vec<StoredNote>,
}

/// List imported notes in insertion order.
async fn list_notes(State(service): State<Arc<ImportService>>) -> Json<NotesResponse> {
    Json(NotesResponse {
        notes: service.store.notes(),
    })
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    imports: MetricsSnapshot,
    notes_stored: usize,
    duplicate_notes: usize,
}

/// Return import counters together with note store totals.
async fn get_metrics(State(service): State<Arc<ImportService>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        imports: service.coordinator.metrics().snapshot(),
        notes_stored: service.store.len(),
        duplicate_notes: service.store.duplicate_count(),
    })
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "import",
                method: "POST",
                path: "/import",
                description: "Import text, markdown, Simplenote (.json) and Evernote (.enex) files. At most one export file per format is used. Response returns { \"notes_imported\": number, \"jobs_failed\": number, \"errors\": [...] }.",
                request_example: Some(json!({
                    "files": [
                        { "name": "todo.md", "content": "# Todo\n- milk" },
                        { "name": "export.json", "content": "{\"activeNotes\": []}" }
                    ]
                })),
            },
            CommandDescriptor {
                name: "list_notes",
                method: "GET",
                path: "/notes",
                description: "Return every imported note with its id and content hash.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return import counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

#[derive(Debug, Error)]
enum ApiError {
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Busy(String),
}

impl ApiError {
    fn from_summary(summary: ImportSummary) -> Self {
        let message = summary
            .errors
            .into_iter()
            .next()
            .map(|report| report.message)
            .unwrap_or_else(|| "Import did not complete.".to_string());
        if message == BATCH_IN_PROGRESS_MESSAGE {
            Self::Busy(message)
        } else {
            Self::Rejected(message)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::Busy(_) => StatusCode::CONFLICT,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::{ImportService, create_router, get_commands};
    use crate::dropzone::DropzoneConfig;
    use crate::engines::{EngineFactory, ImportEngine, StatusSender};
    use crate::importer::{FileCategory, ImportBatch, ImportOptions};
    use crate::notes::NoteSink;
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn service() -> Arc<ImportService> {
        Arc::new(ImportService::new(
            ImportOptions::default(),
            DropzoneConfig::new(".txt,.md,.json,.enex", true),
        ))
    }

    async fn post_import(app: Router, payload: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/import")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");
        read_json(response).await
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        read_json(response).await
    }

    async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&body).expect("json body");
        (status, json)
    }

    #[tokio::test]
    async fn commands_catalog_exposes_import_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let import = commands
            .iter()
            .find(|cmd| cmd.name == "import")
            .expect("import command present");

        assert_eq!(import.method, "POST");
        assert_eq!(import.path, "/import");
        assert!(import.description.contains(".enex"));
        assert!(commands.len() >= 3);
    }

    #[tokio::test]
    async fn import_route_runs_one_batch_across_formats() {
        let service = service();
        let app = create_router(service.clone());
        let export = json!({
            "activeNotes": [{ "content": "from export" }],
            "trashedNotes": []
        });

        let (status, body) = post_import(
            app.clone(),
            json!({
                "files": [
                    { "name": "todo.md", "content": "# Todo" },
                    { "name": "export.json", "content": export.to_string() },
                    { "name": "second.json", "content": "{}" },
                    { "name": "photo.png", "content": "binary" }
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notes_imported"], 2);
        assert_eq!(body["total_jobs"], 2);
        assert_eq!(body["jobs_failed"], 0);
        assert_eq!(body["discarded"], 1);

        let (status, notes) = get_json(app.clone(), "/notes").await;
        assert_eq!(status, StatusCode::OK);
        let mut contents: Vec<&str> = notes["notes"]
            .as_array()
            .expect("notes array")
            .iter()
            .filter_map(|note| note["content"].as_str())
            .collect();
        contents.sort_unstable();
        assert_eq!(contents, vec!["# Todo", "from export"]);

        let (_, metrics) = get_json(app, "/metrics").await;
        assert_eq!(metrics["notes_imported"], 2);
        assert_eq!(metrics["batches_completed"], 1);
        assert_eq!(metrics["notes_stored"], 2);
    }

    #[tokio::test]
    async fn empty_upload_is_a_bad_request() {
        let (status, body) = post_import(create_router(service()), json!({ "files": [] })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No files to import.");
    }

    #[tokio::test]
    async fn disallowed_upload_is_rejected_before_import() {
        let service = service();
        let (status, body) = post_import(
            create_router(service.clone()),
            json!({ "files": [{ "name": "photo.png", "content": "x" }] }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File type is incorrect");
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn failed_engine_is_reported_in_summary() {
        let (status, body) = post_import(
            create_router(service()),
            json!({
                "files": [
                    { "name": "broken.json", "content": "{oops" },
                    { "name": "a.txt", "content": "hello" }
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notes_imported"], 1);
        assert_eq!(body["jobs_failed"], 1);
        assert_eq!(body["errors"][0]["category"], "simplenote");
        assert_eq!(body["errors"][0]["message"], "Invalid json file.");
    }

    struct GatedFactory {
        gate: Arc<Notify>,
    }

    impl EngineFactory for GatedFactory {
        fn create(
            &self,
            _category: FileCategory,
            _sink: Arc<dyn NoteSink>,
            _options: ImportOptions,
        ) -> Box<dyn ImportEngine> {
            Box::new(GatedEngine {
                gate: Arc::clone(&self.gate),
            })
        }
    }

    struct GatedEngine {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ImportEngine for GatedEngine {
        fn category(&self) -> FileCategory {
            FileCategory::Text
        }

        async fn import_notes(&self, _batch: ImportBatch, status: StatusSender) {
            self.gate.notified().await;
            status.complete(0);
        }
    }

    #[tokio::test]
    async fn concurrent_upload_conflicts_with_running_batch() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(
            ImportService::new(
                ImportOptions::default(),
                DropzoneConfig::new(".txt", true),
            )
            .with_engine_factory(Arc::new(GatedFactory { gate: gate.clone() })),
        );
        let app = create_router(service.clone());
        let payload = json!({ "files": [{ "name": "a.txt", "content": "x" }] });

        let first = tokio::spawn(post_import(app.clone(), payload.clone()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !service.is_importing() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("first batch started");

        let (status, body) = post_import(app, payload).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "An import is already in progress.");

        gate.notify_one();
        let (status, _) = first.await.expect("first request");
        assert_eq!(status, StatusCode::OK);
    }
}
