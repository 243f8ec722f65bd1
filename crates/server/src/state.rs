//! Application State
//!
//! Shared state across all HTTP handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;

use voice_agent_config::{load_settings, Settings};
use voice_agent_engine::Scheduler;
use voice_agent_pipeline::DriverContext;

/// Shared across every request. `driver_ctx` carries the pieces a dispatched
/// task's pipeline driver needs; `scheduler` is also reachable through it but
/// kept here directly since most handlers only touch the scheduler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub scheduler: Arc<Scheduler>,
    pub driver_ctx: DriverContext,
    pub metrics_handle: PrometheusHandle,
    env: Option<String>,
}

impl AppState {
    pub fn new(
        config: Settings,
        scheduler: Arc<Scheduler>,
        driver_ctx: DriverContext,
        metrics_handle: PrometheusHandle,
        env: Option<String>,
    ) -> Self {
        Self { config: Arc::new(RwLock::new(config)), scheduler, driver_ctx, metrics_handle, env }
    }

    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }

    /// Reloads configuration from disk. Server/GPU topology/engine timeouts
    /// are re-read here, but the scheduler and driver context built at
    /// startup keep running against the values they were constructed with —
    /// only `config` observers (health checks, `/admin/reload-config`
    /// itself) see the new values until the process restarts.
    pub fn reload_config(&self) -> Result<(), String> {
        let new_config = load_settings(self.env.as_deref()).map_err(|e| format!("failed to reload config: {e}"))?;
        *self.config.write() = new_config;
        tracing::info!("configuration reloaded");
        Ok(())
    }
}
