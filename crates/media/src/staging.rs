use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use voice_agent_core::traits::MediaStaging as MediaStagingTrait;
use voice_agent_core::ErrorKind;

use crate::error::MediaError;
use crate::ffmpeg::{probe_duration_seconds, probe_resolution, run_ffmpeg};
use crate::paths::container_path_of;

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub temp_dir: PathBuf,
    pub reference_audio_max_s: f64,
    pub poll_interval_ms: u64,
    pub stable_polls: u32,
    pub min_stable_bytes: u64,
    pub min_output_bytes: u64,
    pub max_stabilize_polls: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("data/tmp"),
            reference_audio_max_s: 15.0,
            poll_interval_ms: 2_000,
            stable_polls: 3,
            min_stable_bytes: 10 * 1024,
            min_output_bytes: 100 * 1024,
            max_stabilize_polls: 300,
        }
    }
}

/// ffmpeg/ffprobe-backed [`MediaStaging`](voice_agent_core::MediaStaging) implementation.
pub struct FfmpegMediaStaging {
    config: MediaConfig,
}

impl FfmpegMediaStaging {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    fn temp_path(&self, filename: &str) -> PathBuf {
        self.config.temp_dir.join(filename)
    }

    async fn copy_into(&self, src: &Path, dst: &Path) -> Result<(), MediaError> {
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src, dst).await.map_err(MediaError::Io)?;
        Ok(())
    }

    /// Builds a concat-demuxer list file; ffmpeg's `file '...'` syntax only
    /// needs single quotes escaped.
    async fn write_concat_list(&self, ordered_paths: &[PathBuf]) -> Result<PathBuf, MediaError> {
        let mut body = String::new();
        for p in ordered_paths {
            let escaped = p.to_string_lossy().replace('\'', "'\\''");
            body.push_str(&format!("file '{escaped}'\n"));
        }
        let list_path = self.temp_path(&format!("concat-{}.txt", uuid_like()));
        tokio::fs::write(&list_path, body).await?;
        Ok(list_path)
    }

    async fn concat_and_reencode(&self, list_path: &Path, out_path: &Path) -> Result<(), MediaError> {
        let lossless_tmp = self.temp_path(&format!("concat-{}.mp4", uuid_like()));
        let concat_result = run_ffmpeg(&[
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list_path.to_string_lossy().into_owned(),
            "-c".into(),
            "copy".into(),
            lossless_tmp.to_string_lossy().into_owned(),
        ])
        .await;
        let _ = tokio::fs::remove_file(list_path).await;
        concat_result.map_err(|e| MediaError::Concat(e.to_string()))?;

        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let reencode_result = run_ffmpeg(&[
            "-i".into(),
            lossless_tmp.to_string_lossy().into_owned(),
            "-c:v".into(),
            "h264_nvenc".into(),
            "-c:a".into(),
            "copy".into(),
            out_path.to_string_lossy().into_owned(),
        ])
        .await;

        if reencode_result.is_err() {
            warn!("gpu re-encode failed, falling back to lossless concat output");
            tokio::fs::copy(&lossless_tmp, out_path).await.map_err(MediaError::Io)?;
        }
        let _ = tokio::fs::remove_file(&lossless_tmp).await;
        Ok(())
    }
}

fn uuid_like() -> String {
    format!("{:x}", chrono_like_nanos())
}

fn chrono_like_nanos() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0)
}

#[async_trait]
impl MediaStagingTrait for FfmpegMediaStaging {
    async fn extract_reference_audio(&self, video_path: &Path) -> Result<PathBuf, ErrorKind> {
        let stem = video_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "ref".into());
        let out = self.temp_path(&format!("{stem}-ref.wav"));
        if let Some(parent) = out.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(MediaError::Io)?;
        }
        run_ffmpeg(&[
            "-i".into(),
            video_path.to_string_lossy().into_owned(),
            "-vn".into(),
            "-ar".into(),
            "44100".into(),
            "-t".into(),
            self.config.reference_audio_max_s.to_string(),
            out.to_string_lossy().into_owned(),
        ])
        .await
        .map_err(|e| ErrorKind::from(&MediaError::Extraction(e.to_string())))?;
        Ok(out)
    }

    async fn probe_duration(&self, media_path: &Path) -> Result<f64, ErrorKind> {
        probe_duration_seconds(&media_path.to_string_lossy())
            .await
            .map_err(|e| ErrorKind::from(&e))
    }

    async fn stage_for_gpu(
        &self,
        staging_dir: &Path,
        host_video: &Path,
        host_audio: &Path,
        task_id: &str,
    ) -> Result<(String, String), ErrorKind> {
        let video_ext = host_video.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_else(|| "mp4".into());
        let audio_ext = host_audio.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_else(|| "wav".into());
        let staged_video = staging_dir.join(format!("{task_id}-video.{video_ext}"));
        let staged_audio = staging_dir.join(format!("{task_id}-audio.{audio_ext}"));

        self.copy_into(host_video, &staged_video)
            .await
            .map_err(|e| ErrorKind::from(&e))?;
        self.copy_into(host_audio, &staged_audio)
            .await
            .map_err(|e| ErrorKind::from(&e))?;

        Ok((
            container_path_of(&staged_video, staging_dir),
            container_path_of(&staged_audio, staging_dir),
        ))
    }

    async fn stabilize_output(&self, path: &Path) -> Result<Vec<u8>, ErrorKind> {
        let mut stable_count = 0u32;
        let mut prev_size: u64 = 0;

        for _ in 0..self.config.max_stabilize_polls {
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
            let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);

            if size == prev_size && size >= self.config.min_stable_bytes {
                stable_count += 1;
            } else {
                stable_count = 0;
            }
            prev_size = size;

            if stable_count >= self.config.stable_polls {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| ErrorKind::from(&MediaError::Io(e)))?;
                if (bytes.len() as u64) < self.config.min_output_bytes {
                    return Err(ErrorKind::from(&MediaError::TooSmall(format!(
                        "{} bytes",
                        bytes.len()
                    ))));
                }
                return Ok(bytes);
            }
        }
        Err(ErrorKind::from(&MediaError::NeverStabilized(path.display().to_string())))
    }

    async fn concat_chunks(&self, ordered_paths: &[PathBuf], out_path: &Path) -> Result<(), ErrorKind> {
        let list_path = self
            .write_concat_list(ordered_paths)
            .await
            .map_err(|e| ErrorKind::from(&e))?;
        self.concat_and_reencode(&list_path, out_path)
            .await
            .map_err(|e| ErrorKind::from(&e))
    }

    async fn split_audio_equal(&self, audio_path: &Path, n: usize) -> Result<Vec<PathBuf>, ErrorKind> {
        if n == 0 {
            return Err(ErrorKind::StagingError);
        }
        let duration = self.probe_duration(audio_path).await?;
        let chunk_duration = duration / n as f64;
        let stem = audio_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "audio".into());

        let mut outputs = Vec::with_capacity(n);
        for i in 0..n {
            let start = chunk_duration * i as f64;
            let this_duration = if i == n - 1 { duration - start } else { chunk_duration };
            let out = self.temp_path(&format!("{stem}-chunk{i}.wav"));
            run_ffmpeg(&[
                "-ss".into(),
                start.to_string(),
                "-t".into(),
                this_duration.to_string(),
                "-i".into(),
                audio_path.to_string_lossy().into_owned(),
                "-c".into(),
                "copy".into(),
                out.to_string_lossy().into_owned(),
            ])
            .await
            .map_err(|e| ErrorKind::from(&MediaError::Split(e.to_string())))?;
            outputs.push(out);
        }
        Ok(outputs)
    }

    async fn normalize_and_merge(&self, chunk_videos: &[PathBuf], out_path: &Path) -> Result<(), ErrorKind> {
        if chunk_videos.is_empty() {
            return Err(ErrorKind::ConcatFailure);
        }
        let target = probe_resolution(&chunk_videos[0].to_string_lossy())
            .await
            .map_err(|e| ErrorKind::from(&e))?;

        let mut normalized = Vec::with_capacity(chunk_videos.len());
        for (i, video) in chunk_videos.iter().enumerate() {
            let resolution = probe_resolution(&video.to_string_lossy())
                .await
                .map_err(|e| ErrorKind::from(&e))?;
            if resolution == target {
                normalized.push(video.clone());
                continue;
            }
            let scaled = self.temp_path(&format!("merge-scaled-{i}.mp4"));
            run_ffmpeg(&[
                "-i".into(),
                video.to_string_lossy().into_owned(),
                "-vf".into(),
                format!("scale={}:{}", target.0, target.1),
                scaled.to_string_lossy().into_owned(),
            ])
            .await
            .map_err(|e| ErrorKind::from(&MediaError::Concat(e.to_string())))?;
            normalized.push(scaled);
        }

        self.concat_chunks(&normalized, out_path).await
    }
}
