//! Shared TTS → stage → submit → monitor sequence used by both the
//! single-GPU and chunked-parallel drivers once a GPU is already reserved.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use voice_agent_core::traits::{BackendPhase, SubmitOptions, SubmitOutcome};
use voice_agent_core::ErrorKind;

use crate::DriverContext;

pub struct GpuEndpoints {
    pub inference_port: u16,
    pub tts_port: u16,
    pub staging_dir: std::path::PathBuf,
}

/// Stages video+audio onto the GPU's filesystem and submits the job.
/// Shared by the single-GPU path and each chunk of the chunked-parallel path.
pub async fn stage_and_submit(
    ctx: &DriverContext,
    task_id: &str,
    code: &str,
    video_host: &Path,
    audio_host: &Path,
    endpoints: &GpuEndpoints,
) -> Result<(), ErrorKind> {
    let (container_video, container_audio) =
        ctx.media.stage_for_gpu(&endpoints.staging_dir, video_host, audio_host, task_id).await?;

    let outcome = ctx
        .backend
        .submit(
            endpoints.inference_port,
            code,
            &container_video,
            &container_audio,
            SubmitOptions::default(),
        )
        .await?;

    if outcome == SubmitOutcome::Rejected {
        return Err(ErrorKind::SubmitRejected);
    }
    Ok(())
}

/// Polls until the backend reports a terminal status, then stabilizes the
/// output. Shared by the single-GPU path and each chunk of the
/// chunked-parallel path.
pub async fn monitor_and_stabilize(
    ctx: &DriverContext,
    task_id: &str,
    code: &str,
    endpoints: &GpuEndpoints,
    timeout_s: u64,
) -> Result<Vec<u8>, ErrorKind> {
    let started = Instant::now();
    let result_descriptor = monitor(ctx, code, endpoints.inference_port, timeout_s).await?;
    ctx.scheduler.record_inference_ms(task_id, started.elapsed().as_millis() as u64);
    let host_output = voice_agent_media::host_path_of(&result_descriptor, &endpoints.staging_dir);
    ctx.media.stabilize_output(&host_output).await
}

/// Stages, submits, polls and stabilizes in one call — used where no phase
/// transition needs to happen between submit and monitor (each chunk of the
/// chunked-parallel path; the task-level phase there is set once around the
/// whole fan-out, not per chunk).
pub async fn stage_submit_monitor(
    ctx: &DriverContext,
    task_id: &str,
    code: &str,
    video_host: &Path,
    audio_host: &Path,
    endpoints: &GpuEndpoints,
    timeout_s: u64,
) -> Result<Vec<u8>, ErrorKind> {
    stage_and_submit(ctx, task_id, code, video_host, audio_host, endpoints).await?;
    monitor_and_stabilize(ctx, task_id, code, endpoints, timeout_s).await
}

/// Calls TTS; on failure falls back to the reference audio unmodified and
/// reports degradation rather than failing the task outright.
pub async fn synthesize(
    ctx: &DriverContext,
    task_id: &str,
    text: &str,
    reference_audio_host: &Path,
    endpoints: &GpuEndpoints,
) -> Result<(std::path::PathBuf, bool), ErrorKind> {
    let container_ref = voice_agent_media::container_path_of(reference_audio_host, &endpoints.staging_dir);
    let started = Instant::now();

    let result = match ctx.backend.tts_invoke(endpoints.tts_port, text, &container_ref, "wav").await {
        Ok(bytes) => {
            let out = ctx.paths.temp_dir.join(format!("{task_id}-tts.wav"));
            if let Some(parent) = out.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|_| ErrorKind::StagingError)?;
            }
            tokio::fs::write(&out, bytes).await.map_err(|_| ErrorKind::StagingError)?;
            Ok((out, false))
        }
        Err(e) => {
            warn!(task_id, error = %e, "tts synthesis failed, falling back to reference audio");
            Ok((reference_audio_host.to_path_buf(), true))
        }
    };

    ctx.scheduler.record_tts_ms(task_id, started.elapsed().as_millis() as u64);
    let _ = ctx.backend.unload(endpoints.tts_port).await;
    result
}

async fn monitor(
    ctx: &DriverContext,
    code: &str,
    inference_port: u16,
    timeout_s: u64,
) -> Result<String, ErrorKind> {
    let deadline = Instant::now() + Duration::from_secs(timeout_s);
    let mut consecutive_errors = 0u32;

    loop {
        if Instant::now() >= deadline {
            return Err(ErrorKind::Timeout);
        }

        match ctx.backend.query(inference_port, code).await {
            Ok(reply) => {
                consecutive_errors = 0;
                match reply.phase {
                    BackendPhase::Completed => {
                        return reply.result_descriptor.ok_or(ErrorKind::OutputMissing);
                    }
                    BackendPhase::Failed => {
                        return Err(ErrorKind::BackendFailed);
                    }
                    BackendPhase::Pending | BackendPhase::Processing => {
                        info!(code, progress = reply.progress_pct, "inference in progress");
                        ctx.scheduler.set_progress(code, reply.progress_pct);
                    }
                }
            }
            Err(e) if e.is_transient() => {
                consecutive_errors += 1;
                if consecutive_errors >= ctx.engine.max_consecutive_query_errors {
                    return Err(ErrorKind::QueryTransient);
                }
            }
            Err(e) => return Err(e),
        }

        tokio::time::sleep(Duration::from_millis(ctx.engine.query_interval_ms)).await;
    }
}
