use tracing::{error, info};

use voice_agent_core::{ErrorKind, TaskPhase};

use crate::exec::{monitor_and_stabilize, stage_and_submit, synthesize};
use crate::DriverContext;

/// Runs the single-GPU path for a task that has just been granted `gpu_id`:
/// preprocess, synthesize, stage, submit, monitor, stabilize, release.
pub async fn run_single(ctx: DriverContext, task_id: String, gpu_id: u32) {
    let endpoints = match ctx.endpoints(gpu_id) {
        Ok(e) => e,
        Err(kind) => {
            ctx.scheduler.mark_failed(&task_id, kind, "unknown gpu id in dispatch message");
            ctx.scheduler.release_and_dispatch(gpu_id, &task_id);
            return;
        }
    };

    let Some(task) = ctx.scheduler.get_task(&task_id) else {
        error!(task_id, "dispatched task vanished from the table");
        ctx.scheduler.release_and_dispatch(gpu_id, &task_id);
        return;
    };

    let normalized = voice_agent_textnorm::normalize(&task.text);
    let video_host = task.video_path.clone().unwrap_or_else(|| ctx.paths.default_video.clone());

    let reference_audio_host = match (&task.reference_audio_path, &task.video_path) {
        (Some(audio), _) => audio.clone(),
        (None, Some(video)) => {
            ctx.scheduler.set_phase(&task_id, TaskPhase::Preprocessing);
            match ctx.media.extract_reference_audio(video).await {
                Ok(extracted) => extracted,
                Err(kind) => {
                    ctx.scheduler.mark_failed(&task_id, kind, "reference audio extraction failed");
                    ctx.scheduler.release_and_dispatch(gpu_id, &task_id);
                    return;
                }
            }
        }
        (None, None) => ctx.paths.default_reference_audio.clone(),
    };

    ctx.scheduler.set_phase(&task_id, TaskPhase::Tts);
    let (generated_audio_host, tts_degraded) =
        match synthesize(&ctx, &task_id, &normalized, &reference_audio_host, &endpoints).await {
            Ok(r) => r,
            Err(kind) => {
                ctx.scheduler.mark_failed(&task_id, kind, "tts synthesis failed");
                ctx.scheduler.release_and_dispatch(gpu_id, &task_id);
                return;
            }
        };
    if tts_degraded {
        ctx.scheduler.mark_tts_degraded(&task_id);
    }

    ctx.scheduler.set_phase(&task_id, TaskPhase::Submitting);
    if let Err(kind) =
        stage_and_submit(&ctx, &task_id, &task_id, &video_host, &generated_audio_host, &endpoints).await
    {
        ctx.scheduler.mark_failed(&task_id, kind, kind.as_str());
        ctx.scheduler.release_and_dispatch(gpu_id, &task_id);
        return;
    }

    ctx.scheduler.set_phase(&task_id, TaskPhase::Inference);
    ctx.scheduler.set_phase(&task_id, TaskPhase::Monitoring);

    let run_result =
        monitor_and_stabilize(&ctx, &task_id, &task_id, &endpoints, ctx.engine.inference_timeout_s).await;

    match run_result {
        Ok(bytes) => {
            let out_path = ctx.output_path(&task_id);
            if let Some(parent) = out_path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            match tokio::fs::write(&out_path, &bytes).await {
                Ok(()) => {
                    info!(task_id, bytes = bytes.len(), "task completed");
                    ctx.scheduler.mark_completed(&task_id, out_path, Some(ctx.output_url(&task_id)));
                }
                Err(e) => {
                    error!(task_id, error = %e, "failed to write stabilized output");
                    ctx.scheduler.mark_failed(&task_id, ErrorKind::StagingError, e.to_string());
                }
            }
        }
        Err(kind) if kind == ErrorKind::Timeout => {
            ctx.scheduler.mark_timeout(&task_id);
        }
        Err(kind) => {
            ctx.scheduler.mark_failed(&task_id, kind, kind.as_str());
        }
    }

    ctx.scheduler.release_and_dispatch(gpu_id, &task_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use voice_agent_config::{GpuSlotConfig, GpuTopology};
    use voice_agent_core::traits::{
        BackendClient, BackendPhase, GpuRegistry, MediaStaging, QueryReply, SubmitOptions, SubmitOutcome,
    };
    use voice_agent_core::{ErrorKind, GpuSnapshot};
    use voice_agent_engine::Scheduler;

    struct AlwaysDoneBackend;

    #[async_trait]
    impl BackendClient for AlwaysDoneBackend {
        async fn submit(
            &self,
            _inference_port: u16,
            _task_code: &str,
            _v: &str,
            _a: &str,
            _o: SubmitOptions,
        ) -> Result<SubmitOutcome, ErrorKind> {
            Ok(SubmitOutcome::Accepted)
        }

        async fn query(&self, _inference_port: u16, _task_code: &str) -> Result<QueryReply, ErrorKind> {
            Ok(QueryReply {
                phase: BackendPhase::Completed,
                progress_pct: 100,
                result_descriptor: Some("/code/data/out.mp4".into()),
                error_message: None,
            })
        }

        async fn tts_invoke(&self, _p: u16, _t: &str, _r: &str, _f: &str) -> Result<Vec<u8>, ErrorKind> {
            Ok(vec![0u8; 1024])
        }
    }

    struct FakeMedia;

    #[async_trait]
    impl MediaStaging for FakeMedia {
        async fn extract_reference_audio(&self, _v: &Path) -> Result<PathBuf, ErrorKind> {
            Ok(PathBuf::from("/tmp/ref.wav"))
        }
        async fn probe_duration(&self, _p: &Path) -> Result<f64, ErrorKind> {
            Ok(3.0)
        }
        async fn stage_for_gpu(
            &self,
            _staging_dir: &Path,
            _v: &Path,
            _a: &Path,
            _task_id: &str,
        ) -> Result<(String, String), ErrorKind> {
            Ok(("/code/data/video.mp4".into(), "/code/data/audio.wav".into()))
        }
        async fn stabilize_output(&self, _p: &Path) -> Result<Vec<u8>, ErrorKind> {
            Ok(vec![7u8; 200_000])
        }
        async fn concat_chunks(&self, _o: &[PathBuf], _out: &Path) -> Result<(), ErrorKind> {
            Ok(())
        }
        async fn split_audio_equal(&self, _a: &Path, _n: usize) -> Result<Vec<PathBuf>, ErrorKind> {
            Ok(vec![])
        }
        async fn normalize_and_merge(&self, _c: &[PathBuf], _out: &Path) -> Result<(), ErrorKind> {
            Ok(())
        }
    }

    struct FakeRegistry {
        busy: Mutex<bool>,
    }

    impl GpuRegistry for FakeRegistry {
        fn reserve(&self, _task_id: &str) -> Option<u32> {
            let mut b = self.busy.lock();
            if *b {
                None
            } else {
                *b = true;
                Some(0)
            }
        }
        fn release(&self, _gpu_id: u32, _task_id: &str) {
            *self.busy.lock() = false;
        }
        fn reserve_many(&self, _task_id: &str, _n: usize) -> Vec<u32> {
            vec![]
        }
        fn snapshot(&self) -> Vec<GpuSnapshot> {
            vec![]
        }
        fn force_release_all(&self) -> Vec<(u32, String)> {
            vec![]
        }
    }

    fn ctx() -> DriverContext {
        let registry = Arc::new(FakeRegistry { busy: Mutex::new(false) });
        let (scheduler, _rx) = Scheduler::new(registry, 100);
        DriverContext {
            scheduler: Arc::new(scheduler),
            backend: Arc::new(AlwaysDoneBackend),
            media: Arc::new(FakeMedia),
            topology: GpuTopology(vec![GpuSlotConfig {
                id: 0,
                host: "localhost".into(),
                inference_port: 8390,
                tts_port: 18182,
                staging_dir: "/data/gpu0".into(),
            }]),
            engine: voice_agent_config::EngineConfig::default(),
            paths: voice_agent_config::PathsConfig::default(),
        }
    }

    #[tokio::test]
    async fn happy_path_completes_and_releases_the_gpu() {
        let ctx = ctx();
        let task = ctx.scheduler.create_task("two plus two".into());
        ctx.scheduler.reserve_or_queue(&task.id);

        run_single(ctx.clone(), task.id.clone(), 0).await;

        let done = ctx.scheduler.get_task(&task.id).unwrap();
        assert_eq!(done.phase, TaskPhase::Completed);
        assert!(done.outcome.output_path.is_some());
        assert_eq!(done.progress_pct, 100);
        // gpu freed, a new task can reserve it
        let registry = ctx.scheduler.registry();
        assert_eq!(registry.reserve("next"), Some(0));
    }

    #[tokio::test]
    async fn video_without_reference_audio_extracts_instead_of_defaulting() {
        let ctx = ctx();
        let task = ctx.scheduler.create_task("two plus two".into());
        ctx.scheduler.set_inputs(&task.id, Some(PathBuf::from("/host/clip.mp4")), None);
        ctx.scheduler.reserve_or_queue(&task.id);

        run_single(ctx.clone(), task.id.clone(), 0).await;

        let done = ctx.scheduler.get_task(&task.id).unwrap();
        assert_eq!(done.phase, TaskPhase::Completed);
    }

    struct ExtractionFailsMedia;

    #[async_trait]
    impl MediaStaging for ExtractionFailsMedia {
        async fn extract_reference_audio(&self, _v: &Path) -> Result<PathBuf, ErrorKind> {
            Err(ErrorKind::ExtractionError)
        }
        async fn probe_duration(&self, _p: &Path) -> Result<f64, ErrorKind> {
            Ok(3.0)
        }
        async fn stage_for_gpu(
            &self,
            _staging_dir: &Path,
            _v: &Path,
            _a: &Path,
            _task_id: &str,
        ) -> Result<(String, String), ErrorKind> {
            Ok(("/code/data/video.mp4".into(), "/code/data/audio.wav".into()))
        }
        async fn stabilize_output(&self, _p: &Path) -> Result<Vec<u8>, ErrorKind> {
            Ok(vec![7u8; 200_000])
        }
        async fn concat_chunks(&self, _o: &[PathBuf], _out: &Path) -> Result<(), ErrorKind> {
            Ok(())
        }
        async fn split_audio_equal(&self, _a: &Path, _n: usize) -> Result<Vec<PathBuf>, ErrorKind> {
            Ok(vec![])
        }
        async fn normalize_and_merge(&self, _c: &[PathBuf], _out: &Path) -> Result<(), ErrorKind> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_extraction_fails_the_task_and_still_releases_the_gpu() {
        let mut ctx = ctx();
        ctx.media = Arc::new(ExtractionFailsMedia);
        let task = ctx.scheduler.create_task("two plus two".into());
        ctx.scheduler.set_inputs(&task.id, Some(PathBuf::from("/host/clip.mp4")), None);
        ctx.scheduler.reserve_or_queue(&task.id);

        run_single(ctx.clone(), task.id.clone(), 0).await;

        let done = ctx.scheduler.get_task(&task.id).unwrap();
        assert_eq!(done.phase, TaskPhase::Failed);
        assert_eq!(done.outcome.error_kind, Some(ErrorKind::ExtractionError));
        let registry = ctx.scheduler.registry();
        assert_eq!(registry.reserve("next"), Some(0));
    }
}
