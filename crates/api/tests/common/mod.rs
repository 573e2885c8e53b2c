#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use reelforge_api::config::ServerConfig;
use reelforge_api::routes;
use reelforge_api::state::AppState;
use reelforge_comfyui::service::EventFn;
use reelforge_comfyui::{ArtifactRef, ExecutionHandle, ExecutionOutputs, Graph, InferenceError, InferenceService};
use reelforge_core::types::DbId;
use reelforge_db::models::clip::{Clip, ClipOutput, CreateClip};
use reelforge_db::models::project::CreateProject;
use reelforge_db::models::status::ClipStatus;
use reelforge_db::repositories::{ClipRepo, ProjectRepo};
use reelforge_events::ProgressBus;
use reelforge_pipeline::PipelineConfig;
use reelforge_worker::JobNotifier;

// ---------------------------------------------------------------------------
// Inference stand-in
// ---------------------------------------------------------------------------

/// The API only probes the inference service; nothing is ever executed.
pub struct ProbeOnlyInference {
    pub available: bool,
}

#[async_trait]
impl InferenceService for ProbeOnlyInference {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn submit(&self, _graph: &Graph) -> Result<ExecutionHandle, InferenceError> {
        Err(InferenceError::ServiceUnavailable("not in tests".into()))
    }

    async fn await_completion(
        &self,
        _handle: ExecutionHandle,
        _on_event: EventFn<'_>,
        _timeout: Duration,
    ) -> Result<ExecutionOutputs, InferenceError> {
        Err(InferenceError::ServiceUnavailable("not in tests".into()))
    }

    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, InferenceError> {
        Err(InferenceError::ArtifactMissing(artifact.filename.clone()))
    }

    async fn upload_image(&self, _bytes: Vec<u8>, filename: &str) -> Result<String, InferenceError> {
        Ok(filename.to_string())
    }

    async fn release_memory(&self) {}
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        run_workers: false,
    }
}

/// State with an available inference service and a throwaway output root.
pub fn test_state(pool: PgPool) -> AppState {
    test_state_with(pool, true, std::env::temp_dir().join("reelforge-api-tests"))
}

pub fn test_state_with(pool: PgPool, inference_available: bool, output_dir: PathBuf) -> AppState {
    AppState {
        pool,
        config: Arc::new(test_config()),
        pipeline: Arc::new(PipelineConfig {
            output_dir,
            ..PipelineConfig::default()
        }),
        bus: Arc::new(ProgressBus::default()),
        notifier: JobNotifier::new(),
        inference: Arc::new(ProbeOnlyInference {
            available: inference_available,
        }),
    }
}

/// Build the full application router with all middleware layers.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the production middleware stack.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

pub fn build_test_app(pool: PgPool) -> Router {
    build_app(test_state(pool))
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn delete(app: Router, uri: &str) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn seed_project(pool: &PgPool) -> DbId {
    ProjectRepo::create(
        pool,
        &CreateProject {
            name: "Harbour at dawn".into(),
            resolution: "832x480".into(),
            fps: None,
            upscale_multiplier: None,
        },
    )
    .await
    .unwrap()
    .id
}

fn clip_input(project_id: DbId, order_index: i32) -> CreateClip {
    CreateClip {
        project_id,
        order_index,
        prompt: "fishing boats leaving the harbour".into(),
        negative_prompt: String::new(),
        steps: 20,
        cfg_scale: 6.0,
        seed: 42,
        reference_image: None,
        adapter_weight: None,
        model_id: "wan".into(),
        mode: "text_to_video".into(),
        width: Some(832),
        height: Some(480),
        fps: Some(16),
    }
}

pub async fn seed_pending_clip(pool: &PgPool, project_id: DbId, order_index: i32) -> Clip {
    ClipRepo::create_pending(pool, &clip_input(project_id, order_index), None)
        .await
        .unwrap()
}

pub async fn seed_completed_clip(pool: &PgPool, project_id: DbId, order_index: i32) -> Clip {
    let clip = seed_pending_clip(pool, project_id, order_index).await;
    assert!(
        ClipRepo::transition(pool, clip.id, ClipStatus::Pending, ClipStatus::Processing)
            .await
            .unwrap()
    );
    ClipRepo::complete(
        pool,
        clip.id,
        &ClipOutput {
            output_path: format!("clips/clip_{}_42.mp4", clip.id),
            output_name: format!("clip_{}_42.mp4", clip.id),
            thumbnail_path: None,
            thumbnail_name: None,
            duration_sec: 5.0625,
            frame_count: 81,
            width: 832,
            height: 480,
            fps: 16,
        },
    )
    .await
    .unwrap()
    .unwrap()
}

pub async fn job_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs")
        .fetch_one(pool)
        .await
        .unwrap()
}
