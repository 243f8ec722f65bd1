//! Thin wrappers around the `ffmpeg`/`ffprobe` binaries.
//!
//! Argument order matters to ffmpeg (global flags before `-i`, output options
//! after); each builder below documents the ordering it relies on.

use tokio::process::Command;

use crate::error::MediaError;

/// Runs `ffmpeg` with `args`, folding a non-zero exit into a [`MediaError`].
pub async fn run_ffmpeg(args: &[String]) -> Result<(), MediaError> {
    let output = Command::new("ffmpeg")
        .arg("-y")
        .args(args)
        .output()
        .await
        .map_err(|e| MediaError::Extraction(format!("failed to spawn ffmpeg: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::Extraction(format!(
            "ffmpeg exited with {}: {stderr}",
            output.status
        )));
    }
    Ok(())
}

/// Runs `ffprobe -show_entries format=duration` and parses the seconds value.
pub async fn probe_duration_seconds(path: &str) -> Result<f64, MediaError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "csv=p=0",
            path,
        ])
        .output()
        .await
        .map_err(|e| MediaError::Probe(format!("failed to spawn ffprobe: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::Probe(format!("ffprobe exited with {}: {stderr}", output.status)));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.trim()
        .parse::<f64>()
        .map_err(|_| MediaError::Probe(format!("no duration in ffprobe output: {text:?}")))
}

/// Runs `ffprobe -show_entries stream=width,height` for the first video stream.
pub async fn probe_resolution(path: &str) -> Result<(u32, u32), MediaError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
            path,
        ])
        .output()
        .await
        .map_err(|e| MediaError::Probe(format!("failed to spawn ffprobe: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::Probe(format!("ffprobe exited with {}: {stderr}", output.status)));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let (w, h) = text
        .trim()
        .split_once('x')
        .ok_or_else(|| MediaError::Probe(format!("no resolution in ffprobe output: {text:?}")))?;
    let width = w.parse().map_err(|_| MediaError::Probe(format!("bad width: {w}")))?;
    let height = h.parse().map_err(|_| MediaError::Probe(format!("bad height: {h}")))?;
    Ok((width, height))
}
