//! Prometheus metrics exposed at `/metrics`.
//!
//! Gauges are sampled from the scheduler/registry at scrape time rather than
//! pushed from every mutation site — `gpu_busy`, `wait_queue_depth` and
//! `tasks_in_phase` are all cheap point-in-time reads, so there's no reason
//! to thread a `metrics::gauge!` call through every reserve/release/phase
//! transition.

use axum::extract::State;
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use voice_agent_core::TaskPhase;

use crate::state::AppState;

/// Installs the global recorder. Call once at startup; the returned handle
/// is what `/metrics` renders from, stashed on [`AppState`].
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new().install_recorder().expect("failed to install prometheus recorder")
}

const PHASES: &[TaskPhase] = &[
    TaskPhase::Accepted,
    TaskPhase::Preprocessing,
    TaskPhase::Reserving,
    TaskPhase::Queued,
    TaskPhase::Tts,
    TaskPhase::Submitting,
    TaskPhase::Inference,
    TaskPhase::Monitoring,
    TaskPhase::Completed,
    TaskPhase::Failed,
    TaskPhase::Timeout,
];

fn sample_gauges(state: &AppState) {
    let snapshot = state.scheduler.registry().snapshot();
    let busy = snapshot.iter().filter(|s| s.busy).count();
    gauge!("gpu_busy").set(busy as f64);
    gauge!("wait_queue_depth").set(state.scheduler.queue_depth() as f64);

    for phase in PHASES {
        gauge!("tasks_in_phase", "phase" => phase.to_string())
            .set(state.scheduler.count_in_phase(*phase) as f64);
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> String {
    sample_gauges(&state);
    state.metrics_handle.render()
}
