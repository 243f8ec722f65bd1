//! Binds text normalization, the TTS/inference backend client and GPU
//! staging into the six-step run a dispatched task executes once it holds a
//! reservation; the chunked variant fans the same steps out across several
//! GPUs and re-merges the results.
//!
//! The driver never touches [`voice_agent_engine::Scheduler`]'s lock directly
//! — it only calls the scheduler's public methods, so the critical section
//! for reserve/release/phase transitions stays exactly where the engine
//! crate put it.

mod chunked;
mod exec;
mod single;

pub use chunked::run_chunked;
pub use single::run_single;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use voice_agent_config::{EngineConfig, GpuTopology, PathsConfig};
use voice_agent_core::traits::{BackendClient, MediaStaging};
use voice_agent_engine::{DispatchReceiver, Scheduler};

use crate::exec::GpuEndpoints;

/// Everything a driver run needs besides the task id and assigned GPU.
///
/// Ports and staging directories come straight from the static topology
/// rather than the registry: those fields never change once loaded, so
/// there's no need to route through the registry's reserve/release lock to
/// read them.
#[derive(Clone)]
pub struct DriverContext {
    pub scheduler: Arc<Scheduler>,
    pub backend: Arc<dyn BackendClient>,
    pub media: Arc<dyn MediaStaging>,
    pub topology: GpuTopology,
    pub engine: EngineConfig,
    pub paths: PathsConfig,
}

impl DriverContext {
    pub fn output_path(&self, task_id: &str) -> PathBuf {
        self.paths.outputs_dir.join(format!("{task_id}.mp4"))
    }

    pub fn output_url(&self, task_id: &str) -> String {
        format!("/outputs/{task_id}.mp4")
    }

    fn endpoints(&self, gpu_id: u32) -> Result<GpuEndpoints, voice_agent_core::ErrorKind> {
        self.topology
            .0
            .iter()
            .find(|s| s.id == gpu_id)
            .map(|s| GpuEndpoints {
                inference_port: s.inference_port,
                tts_port: s.tts_port,
                staging_dir: s.staging_dir.clone(),
            })
            .ok_or(voice_agent_core::ErrorKind::StagingError)
    }
}

/// Drains the scheduler's dispatch channel for the lifetime of the process,
/// spawning a [`run_single`] task for each reservation the scheduler hands
/// out. Intended to be started once at application startup; returns only
/// when the channel closes (scheduler dropped).
///
/// Chunked tasks never flow through this channel — `reserveMany` has its own
/// bounded wait and is driven directly by the submission handler, not by the
/// FIFO single-GPU wait queue this loop drains.
pub async fn run_dispatch_loop(ctx: DriverContext, mut rx: DispatchReceiver) {
    while let Some(dispatched) = rx.recv().await {
        info!(task_id = %dispatched.task_id, gpu_id = dispatched.gpu_id, "dispatching task");
        let ctx = ctx.clone();
        tokio::spawn(async move {
            run_single(ctx, dispatched.task_id, dispatched.gpu_id).await;
        });
    }
}
