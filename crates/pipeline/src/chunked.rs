use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use voice_agent_core::TaskPhase;

use crate::exec::{stage_submit_monitor, synthesize};
use crate::DriverContext;

/// Chunked-parallel path: one cloned-audio file split into N equal slices (N
/// = number of GPUs), each slice fanned to its own reserved GPU and the
/// results concatenated in chunk-index order. A task only completes once
/// every chunk does; any chunk's terminal failure fails the whole task and no
/// partial file is written.
pub async fn run_chunked(ctx: DriverContext, task_id: String) {
    let Some(task) = ctx.scheduler.get_task(&task_id) else {
        error!(task_id, "dispatched chunked task vanished from the table");
        return;
    };

    let normalized = voice_agent_textnorm::normalize(&task.text);
    let video_host = task.video_path.clone().unwrap_or_else(|| ctx.paths.default_video.clone());
    let reference_audio_host = task
        .reference_audio_path
        .clone()
        .unwrap_or_else(|| ctx.paths.default_reference_audio.clone());

    ctx.scheduler.set_phase(&task_id, TaskPhase::Tts);

    let n = ctx.topology.0.len();
    // Any slot's endpoints work for the shared TTS call; reservation happens after.
    let Some(first) = ctx.topology.0.first() else {
        ctx.scheduler.mark_failed(&task_id, voice_agent_core::ErrorKind::InsufficientGpus, "no gpus configured");
        return;
    };
    let tts_endpoints = match ctx.endpoints(first.id) {
        Ok(e) => e,
        Err(kind) => {
            ctx.scheduler.mark_failed(&task_id, kind, "failed to resolve gpu endpoints");
            return;
        }
    };

    let (generated_audio_host, tts_degraded) =
        match synthesize(&ctx, &task_id, &normalized, &reference_audio_host, &tts_endpoints).await {
            Ok(r) => r,
            Err(kind) => {
                ctx.scheduler.mark_failed(&task_id, kind, "tts synthesis failed");
                return;
            }
        };
    if tts_degraded {
        ctx.scheduler.mark_tts_degraded(&task_id);
    }

    let chunk_paths = match ctx.media.split_audio_equal(&generated_audio_host, n).await {
        Ok(p) => p,
        Err(kind) => {
            ctx.scheduler.mark_failed(&task_id, kind, "audio splitting failed");
            return;
        }
    };

    ctx.scheduler.set_phase(&task_id, TaskPhase::Reserving);
    let gpu_ids = match reserve_all_with_wait(&ctx, &task_id, n).await {
        Some(ids) => ids,
        None => {
            ctx.scheduler.mark_failed(
                &task_id,
                voice_agent_core::ErrorKind::InsufficientGpus,
                format!("fewer than {n} gpus free within the wait window"),
            );
            return;
        }
    };

    ctx.scheduler.set_phase(&task_id, TaskPhase::Submitting);

    let chunk_results = run_chunks(&ctx, &task_id, &video_host, &chunk_paths, &gpu_ids).await;

    for gpu_id in &gpu_ids {
        ctx.scheduler.registry().release(*gpu_id, &task_id);
    }

    let mut outputs = Vec::with_capacity(chunk_results.len());
    for result in chunk_results {
        match result {
            Ok(bytes) => outputs.push(bytes),
            Err(kind) => {
                ctx.scheduler.mark_failed(&task_id, kind, "a chunk failed, no partial output written");
                ctx.scheduler.try_dispatch();
                return;
            }
        }
    }

    ctx.scheduler.set_phase(&task_id, TaskPhase::Monitoring);

    let chunk_host_paths: Vec<_> = outputs
        .into_iter()
        .enumerate()
        .map(|(i, bytes)| {
            let path = ctx.paths.temp_dir.join(format!("{task_id}-chunk{i}.mp4"));
            (path, bytes)
        })
        .collect();

    for (path, bytes) in &chunk_host_paths {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(e) = tokio::fs::write(path, bytes).await {
            error!(task_id, error = %e, "failed to stage chunk output for concat");
            ctx.scheduler.mark_failed(&task_id, voice_agent_core::ErrorKind::StagingError, e.to_string());
            ctx.scheduler.try_dispatch();
            return;
        }
    }

    let ordered_paths: Vec<_> = chunk_host_paths.into_iter().map(|(p, _)| p).collect();
    let out_path = ctx.output_path(&task_id);
    if let Some(parent) = out_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }

    match ctx.media.concat_chunks(&ordered_paths, &out_path).await {
        Ok(()) => {
            info!(task_id, chunks = n, "chunked task completed");
            ctx.scheduler.mark_completed(&task_id, out_path, Some(ctx.output_url(&task_id)));
        }
        Err(_) => {
            ctx.scheduler.mark_failed(&task_id, voice_agent_core::ErrorKind::ConcatFailure, "final concat failed");
        }
    }

    ctx.scheduler.try_dispatch();
}

/// Attempts `registry.reserve_many` repeatedly until `n` distinct slots are
/// held or the configured wait window elapses; releases any partial grant
/// before giving up so a failed chunked task never leaks a reservation.
async fn reserve_all_with_wait(ctx: &DriverContext, task_id: &str, n: usize) -> Option<Vec<u32>> {
    let deadline = Instant::now() + Duration::from_secs(ctx.engine.reserve_many_wait_s);
    let mut held = ctx.scheduler.registry().reserve_many(task_id, n);

    while held.len() < n {
        if Instant::now() >= deadline {
            warn!(task_id, have = held.len(), need = n, "timed out waiting for enough free gpus");
            for gpu_id in &held {
                ctx.scheduler.registry().release(*gpu_id, task_id);
            }
            return None;
        }
        tokio::time::sleep(Duration::from_millis(ctx.engine.query_interval_ms)).await;
        held.extend(ctx.scheduler.registry().reserve_many(task_id, n - held.len()));
    }

    Some(held)
}

async fn run_chunks(
    ctx: &DriverContext,
    task_id: &str,
    video_host: &std::path::Path,
    chunk_paths: &[std::path::PathBuf],
    gpu_ids: &[u32],
) -> Vec<Result<Vec<u8>, voice_agent_core::ErrorKind>> {
    let mut handles = Vec::with_capacity(gpu_ids.len());

    for (i, (&gpu_id, chunk_audio)) in gpu_ids.iter().zip(chunk_paths.iter()).enumerate() {
        let ctx = ctx.clone();
        let task_id = task_id.to_string();
        let video_host = video_host.to_path_buf();
        let chunk_audio = chunk_audio.clone();
        let code = format!("{task_id}-c{i}");
        let timeout_s = ctx.engine.chunk_inference_timeout_s;

        handles.push(tokio::spawn(async move {
            let endpoints = match ctx.endpoints(gpu_id) {
                Ok(e) => e,
                Err(kind) => return Err(kind),
            };
            stage_submit_monitor(&ctx, &code, &code, &video_host, &chunk_audio, &endpoints, timeout_s).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(r) => results.push(r),
            Err(_) => results.push(Err(voice_agent_core::ErrorKind::BackendFailed)),
        }
    }
    results
}
