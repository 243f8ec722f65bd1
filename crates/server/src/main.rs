//! GPU task orchestrator entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_agent_client::{HttpBackendClient, HttpBackendClientConfig};
use voice_agent_config::{load_settings, Settings};
use voice_agent_engine::Scheduler;
use voice_agent_media::FfmpegMediaStaging;
use voice_agent_pipeline::{run_dispatch_loop, DriverContext};
use voice_agent_registry::InMemoryGpuRegistry;
use voice_agent_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("GPU_ORCH_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!("loaded configuration (env: {})", env.as_deref().unwrap_or("default"));
            settings
        }
        Err(e) => {
            eprintln!("warning: failed to load config: {e}. using defaults.");
            Settings::default()
        }
    };

    init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting gpu task orchestrator");
    tracing::info!(environment = ?config.environment, gpu_slots = config.gpu.0.len(), "configuration loaded");

    let metrics_handle = init_metrics();
    tracing::info!("prometheus metrics installed at /metrics");

    let registry = Arc::new(InMemoryGpuRegistry::new(&config.gpu));
    let (scheduler, dispatch_rx) = Scheduler::new(registry, config.engine.task_table_capacity);
    let scheduler = Arc::new(scheduler);

    let backend_config = HttpBackendClientConfig {
        min_tts_bytes: config.engine.min_tts_bytes as usize,
        ..HttpBackendClientConfig::default()
    };
    let media_config = voice_agent_media::MediaConfig {
        temp_dir: config.paths.temp_dir.clone(),
        poll_interval_ms: config.engine.stabilize_poll_ms,
        stable_polls: config.engine.stabilize_stable_polls,
        min_stable_bytes: config.engine.min_stable_bytes,
        min_output_bytes: config.engine.min_output_bytes,
        ..voice_agent_media::MediaConfig::default()
    };

    let driver_ctx = DriverContext {
        scheduler: scheduler.clone(),
        backend: Arc::new(HttpBackendClient::new(backend_config)),
        media: Arc::new(FfmpegMediaStaging::new(media_config)),
        topology: config.gpu.clone(),
        engine: config.engine.clone(),
        paths: config.paths.clone(),
    };

    tokio::spawn(run_dispatch_loop(driver_ctx.clone(), dispatch_rx));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let state = AppState::new(config, scheduler, driver_ctx, metrics_handle, env);

    let app = create_router(state);
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received sigterm, shutting down"),
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("voice_agent={},tower_http=debug", config.server.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer =
        if config.server.log_json { tracing_subscriber::fmt::layer().json().boxed() } else { tracing_subscriber::fmt::layer().boxed() };
    subscriber.with(fmt_layer).init();
}
