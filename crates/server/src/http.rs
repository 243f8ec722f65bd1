//! HTTP surface: task submission, status polling, admin controls.

use std::path::PathBuf;

use axum::extract::{Json, Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use voice_agent_core::TaskPhase;
use voice_agent_pipeline::{run_chunked, run_single};

use crate::metrics::metrics_handler;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let config = state.get_config();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    drop(config);

    Router::new()
        .route("/tasks", post(submit_task))
        .route("/tasks/:id", get(get_task))
        .route("/admin/reset", post(admin_reset))
        .route("/admin/reload-config", post(reload_config))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled, allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| {
            o.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %o, "invalid CORS origin");
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    CorsLayer::new().allow_origin(parsed).allow_methods([Method::GET, Method::POST]).allow_headers(Any)
}

#[derive(Debug, Deserialize)]
struct SubmitTaskRequest {
    text: String,
    avatar_id: Option<String>,
    video_path: Option<PathBuf>,
    reference_audio_path: Option<PathBuf>,
    #[serde(default)]
    chunked: bool,
}

#[derive(Debug, Serialize)]
struct SubmitTaskResponse {
    task_id: String,
    phase: TaskPhase,
}

/// `POST /tasks` — accepts a task, resolves its inputs, then either reserves
/// a GPU immediately and spawns its driver or joins the FIFO wait queue
/// (single-GPU path), or kicks off the chunked-parallel path directly —
/// chunked tasks never enter the single-GPU wait queue since `reserveMany`
/// has its own bounded wait.
async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<SubmitTaskRequest>,
) -> Result<Json<SubmitTaskResponse>, StatusCode> {
    if request.text.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (video_path, reference_audio_path) = resolve_inputs(&state, &request);

    let task = state.scheduler.create_task(request.text);
    state.scheduler.set_inputs(&task.id, video_path, reference_audio_path);

    if request.chunked {
        let ctx = state.driver_ctx.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move { run_chunked(ctx, task_id).await });
        return Ok(Json(SubmitTaskResponse { task_id: task.id, phase: TaskPhase::Tts }));
    }

    let phase = match state.scheduler.reserve_or_queue(&task.id) {
        Some(gpu_id) => {
            let ctx = state.driver_ctx.clone();
            let task_id = task.id.clone();
            tokio::spawn(async move { run_single(ctx, task_id, gpu_id).await });
            TaskPhase::Reserving
        }
        None => TaskPhase::Queued,
    };

    Ok(Json(SubmitTaskResponse { task_id: task.id, phase }))
}

fn resolve_inputs(state: &AppState, request: &SubmitTaskRequest) -> (Option<PathBuf>, Option<PathBuf>) {
    if let Some(avatar_id) = &request.avatar_id {
        let config = state.get_config();
        if let Some(avatar) = config.avatars.0.iter().find(|a| &a.id == avatar_id) {
            return (
                request.video_path.clone().or_else(|| Some(avatar.video_path.clone())),
                request.reference_audio_path.clone().or_else(|| Some(avatar.audio_path.clone())),
            );
        }
    }
    (request.video_path.clone(), request.reference_audio_path.clone())
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, StatusCode> {
    let task = state.scheduler.get_task(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::json!({
        "id": task.id,
        "phase": task.phase,
        "progress_pct": task.progress_pct,
        "gpu_id": task.gpu_id,
        "tts_degraded": task.tts_degraded,
        "output_url": task.outcome.output_url,
        "error_kind": task.outcome.error_kind,
        "error_message": task.outcome.error_message,
        "queue_depth": state.scheduler.queue_depth(),
        "timing": {
            "tts_s": task.timings.tts_ms.map(|ms| ms as f64 / 1000.0),
            "inference_s": task.timings.inference_ms.map(|ms| ms as f64 / 1000.0),
            "total_s": task.timings.total_s(),
        },
    })))
}

/// `POST /admin/reset` — fails every non-terminal task and frees every GPU.
async fn admin_reset(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.admin_reset();
    (StatusCode::OK, Json(serde_json::json!({ "status": "reset" })))
}

async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_config() {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "success" }))),
        Err(e) => {
            tracing::error!(error = %e, "config reload failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "status": "error", "message": e })))
        }
    }
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let config = state.get_config();
    let gpu_count = config.gpu.0.len();
    drop(config);

    let status = if gpu_count > 0 { "healthy" } else { "degraded" };
    let code = if gpu_count > 0 { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "gpu_slots": gpu_count,
        })),
    )
}

async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let snapshot = state.scheduler.registry().snapshot();
    let free = snapshot.iter().filter(|s| !s.busy).count();
    let queue_depth = state.scheduler.queue_depth();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "gpus_free": free,
            "gpus_total": snapshot.len(),
            "queue_depth": queue_depth,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use voice_agent_config::Settings;
    use voice_agent_core::traits::{BackendClient, BackendPhase, MediaStaging, QueryReply, SubmitOptions, SubmitOutcome};
    use voice_agent_core::ErrorKind;
    use voice_agent_engine::Scheduler;
    use voice_agent_registry::InMemoryGpuRegistry;

    struct NoopBackend;

    #[async_trait::async_trait]
    impl BackendClient for NoopBackend {
        async fn submit(&self, _p: u16, _c: &str, _v: &str, _a: &str, _o: SubmitOptions) -> Result<SubmitOutcome, ErrorKind> {
            Ok(SubmitOutcome::Accepted)
        }
        async fn query(&self, _p: u16, _c: &str) -> Result<QueryReply, ErrorKind> {
            Ok(QueryReply { phase: BackendPhase::Pending, progress_pct: 0, result_descriptor: None, error_message: None })
        }
        async fn tts_invoke(&self, _p: u16, _t: &str, _r: &str, _f: &str) -> Result<Vec<u8>, ErrorKind> {
            Ok(vec![])
        }
    }

    struct NoopMedia;

    #[async_trait::async_trait]
    impl MediaStaging for NoopMedia {
        async fn extract_reference_audio(&self, _v: &std::path::Path) -> Result<PathBuf, ErrorKind> {
            Ok(PathBuf::from("/tmp/ref.wav"))
        }
        async fn probe_duration(&self, _p: &std::path::Path) -> Result<f64, ErrorKind> {
            Ok(1.0)
        }
        async fn stage_for_gpu(&self, _s: &std::path::Path, _v: &std::path::Path, _a: &std::path::Path, _t: &str) -> Result<(String, String), ErrorKind> {
            Ok((String::new(), String::new()))
        }
        async fn stabilize_output(&self, _p: &std::path::Path) -> Result<Vec<u8>, ErrorKind> {
            Ok(vec![])
        }
        async fn concat_chunks(&self, _o: &[PathBuf], _out: &std::path::Path) -> Result<(), ErrorKind> {
            Ok(())
        }
        async fn split_audio_equal(&self, _a: &std::path::Path, _n: usize) -> Result<Vec<PathBuf>, ErrorKind> {
            Ok(vec![])
        }
        async fn normalize_and_merge(&self, _c: &[PathBuf], _out: &std::path::Path) -> Result<(), ErrorKind> {
            Ok(())
        }
    }

    fn test_state() -> AppState {
        let settings = Settings::default();
        let registry = Arc::new(InMemoryGpuRegistry::new(&settings.gpu));
        let (scheduler, _rx) = Scheduler::new(registry, settings.engine.task_table_capacity);
        let scheduler = Arc::new(scheduler);
        let driver_ctx = voice_agent_pipeline::DriverContext {
            scheduler: scheduler.clone(),
            backend: Arc::new(NoopBackend),
            media: Arc::new(NoopMedia),
            topology: settings.gpu.clone(),
            engine: settings.engine.clone(),
            paths: settings.paths.clone(),
        };
        let handle = crate::metrics::init_metrics();
        AppState::new(settings, scheduler, driver_ctx, handle, None)
    }

    #[test]
    fn router_builds() {
        let _ = create_router(test_state());
    }
}
