//! Seams between the engine/pipeline crates and their HTTP- and
//! filesystem-backed collaborators.
//!
//! Keeping these as traits (rather than calling `voice-agent-client` /
//! `voice-agent-media` directly) lets tests inject fakes, per the registry's
//! own "process-wide singleton with explicit lifecycle" design: production
//! wiring hands the task engine `Arc<dyn BackendClient>` / `Arc<dyn MediaStaging>`
//! / `Arc<dyn GpuRegistry>`, tests hand it fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::gpu_slot::GpuSnapshot;

/// Fixed option set accepted by the inference backend's submit call.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOptions {
    pub superres: bool,
    pub watermark: bool,
    pub pn: u32,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self { superres: false, watermark: false, pn: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected,
}

/// Decoded backend status. Unknown integer codes map to `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPhase {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BackendPhase {
    pub fn from_status_code(code: i64) -> Self {
        match code {
            0 => BackendPhase::Pending,
            2 => BackendPhase::Completed,
            3 => BackendPhase::Failed,
            _ => BackendPhase::Processing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryReply {
    pub phase: BackendPhase,
    pub progress_pct: u8,
    pub result_descriptor: Option<String>,
    pub error_message: Option<String>,
}

/// HTTP calls against a GPU-bound inference backend and its paired TTS backend.
///
/// No retries live behind this trait: every method either succeeds or returns
/// an [`ErrorKind`]; retry policy belongs to the pipeline driver that calls it.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn submit(
        &self,
        inference_port: u16,
        task_code: &str,
        container_video_path: &str,
        container_audio_path: &str,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, ErrorKind>;

    async fn query(&self, inference_port: u16, task_code: &str) -> Result<QueryReply, ErrorKind>;

    /// Returns generated audio bytes, or an `ErrorKind` the caller should treat
    /// as a TTS degradation (fall back to the reference audio), never fatal.
    async fn tts_invoke(
        &self,
        tts_port: u16,
        text: &str,
        reference_audio_container_path: &str,
        format: &str,
    ) -> Result<Vec<u8>, ErrorKind>;

    /// Best-effort hint to release VRAM held by the TTS backend between
    /// tasks. Not every backend implements it; the default no-ops.
    async fn unload(&self, _tts_port: u16) -> Result<(), ErrorKind> {
        Ok(())
    }
}

/// Filesystem/media-tool operations: extraction, staging, stabilization, concat.
#[async_trait]
pub trait MediaStaging: Send + Sync {
    async fn extract_reference_audio(&self, video_path: &Path) -> Result<PathBuf, ErrorKind>;

    async fn probe_duration(&self, media_path: &Path) -> Result<f64, ErrorKind>;

    async fn stage_for_gpu(
        &self,
        staging_dir: &Path,
        host_video: &Path,
        host_audio: &Path,
        task_id: &str,
    ) -> Result<(String, String), ErrorKind>;

    async fn stabilize_output(&self, path: &Path) -> Result<Vec<u8>, ErrorKind>;

    async fn concat_chunks(&self, ordered_paths: &[PathBuf], out_path: &Path) -> Result<(), ErrorKind>;

    async fn split_audio_equal(&self, audio_path: &Path, n: usize) -> Result<Vec<PathBuf>, ErrorKind>;

    async fn normalize_and_merge(
        &self,
        chunk_videos: &[PathBuf],
        out_path: &Path,
    ) -> Result<(), ErrorKind>;
}

/// Process-wide table of GPU slots with atomic reserve/release.
///
/// The only place a slot's busy flag may be read or written. A
/// concrete implementation lives in `voice-agent-registry`; this trait lets
/// the engine and pipeline depend on the contract rather than the
/// `parking_lot::Mutex` it is built on.
pub trait GpuRegistry: Send + Sync {
    /// Reserves the lowest-id free slot for `task_id`, or `None` if all are busy.
    fn reserve(&self, task_id: &str) -> Option<u32>;

    /// Releases `gpu_id` if it is currently bound to `task_id`; logs and no-ops otherwise.
    fn release(&self, gpu_id: u32, task_id: &str);

    /// Best-effort atomic reservation of up to `n` distinct slots for one task.
    fn reserve_many(&self, task_id: &str, n: usize) -> Vec<u32>;

    fn snapshot(&self) -> Vec<GpuSnapshot>;

    /// Marks every busy slot free, unconditionally. Used by the admin reset surface.
    fn force_release_all(&self) -> Vec<(u32, String)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_phase_maps_known_codes() {
        assert_eq!(BackendPhase::from_status_code(0), BackendPhase::Pending);
        assert_eq!(BackendPhase::from_status_code(1), BackendPhase::Processing);
        assert_eq!(BackendPhase::from_status_code(2), BackendPhase::Completed);
        assert_eq!(BackendPhase::from_status_code(3), BackendPhase::Failed);
    }

    #[test]
    fn backend_phase_defaults_unknown_codes_to_processing() {
        assert_eq!(BackendPhase::from_status_code(99), BackendPhase::Processing);
        assert_eq!(BackendPhase::from_status_code(-1), BackendPhase::Processing);
    }

    #[test]
    fn submit_options_default_is_conservative() {
        let o = SubmitOptions::default();
        assert!(!o.superres);
        assert!(!o.watermark);
        assert_eq!(o.pn, 1);
    }
}
