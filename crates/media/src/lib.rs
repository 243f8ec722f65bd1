//! ffmpeg/ffprobe-backed implementation of [`voice_agent_core::MediaStaging`].
//!
//! Every external tool invocation runs through [`tokio::process::Command`] so
//! the suspension points it creates yield to other pipeline workers rather
//! than blocking a runtime thread.

mod error;
mod ffmpeg;
mod paths;
mod staging;

pub use error::MediaError;
pub use paths::{container_path_of, host_path_of};
pub use staging::{FfmpegMediaStaging, MediaConfig};
