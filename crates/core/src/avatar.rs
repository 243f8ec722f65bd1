//! Avatar: a named, pre-registered `(video, audio)` pair resolved by `avatar_id`.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Avatar {
    pub id: String,
    pub display_name: String,
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
}
