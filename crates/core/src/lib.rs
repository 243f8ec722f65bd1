//! Core types, traits and error taxonomy for the GPU task orchestrator.
//!
//! This crate provides the foundational, dependency-light vocabulary shared by
//! every other crate in the workspace:
//! - [`Task`], [`TaskPhase`] and the timing/outcome types attached to a task.
//! - [`GpuSlot`] and the registry-facing snapshot type.
//! - [`Chunk`] for the chunked-parallel pipeline variant.
//! - [`Avatar`], a static `(video, audio)` lookup entry.
//! - [`error::ErrorKind`], the taxonomy surfaced at the HTTP boundary.
//! - [`traits`], the `BackendClient` / `MediaStaging` / `GpuRegistry` seams that
//!   let the engine and pipeline crates depend on abstractions rather than
//!   concrete HTTP or filesystem implementations.

pub mod avatar;
pub mod chunk;
pub mod error;
pub mod gpu_slot;
pub mod ids;
pub mod task;
pub mod traits;

pub use avatar::Avatar;
pub use chunk::Chunk;
pub use error::{ErrorKind, Result};
pub use gpu_slot::{GpuSlot, GpuSnapshot};
pub use ids::new_task_id;
pub use task::{Task, TaskOutcome, TaskPhase, TaskTimings};
pub use traits::{
    BackendClient, BackendPhase, GpuRegistry, MediaStaging, QueryReply, SubmitOptions,
    SubmitOutcome,
};
