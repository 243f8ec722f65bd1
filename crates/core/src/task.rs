//! Task: one per client request, owned exclusively by the task engine's table.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Lifecycle phase of a [`Task`]. Transitions are strictly forward; see the
/// task engine for the transition table. [`Completed`](TaskPhase::Completed),
/// [`Failed`](TaskPhase::Failed) and [`Timeout`](TaskPhase::Timeout) are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Accepted,
    Preprocessing,
    Reserving,
    Queued,
    Tts,
    Submitting,
    Inference,
    Monitoring,
    Completed,
    Failed,
    Timeout,
}

impl TaskPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskPhase::Completed | TaskPhase::Failed | TaskPhase::Timeout)
    }

    /// Whether a task in this phase holds (or is about to hold) a GPU reservation.
    pub fn holds_reservation(self) -> bool {
        matches!(
            self,
            TaskPhase::Reserving
                | TaskPhase::Tts
                | TaskPhase::Submitting
                | TaskPhase::Inference
                | TaskPhase::Monitoring
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPhase::Accepted => "accepted",
            TaskPhase::Preprocessing => "preprocessing",
            TaskPhase::Reserving => "reserving",
            TaskPhase::Queued => "queued",
            TaskPhase::Tts => "tts",
            TaskPhase::Submitting => "submitting",
            TaskPhase::Inference => "inference",
            TaskPhase::Monitoring => "monitoring",
            TaskPhase::Completed => "completed",
            TaskPhase::Failed => "failed",
            TaskPhase::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic timestamps and derived durations recorded across a task's life.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskTimings {
    pub queued_at: Option<DateTime<Utc>>,
    pub preprocessing_at: Option<DateTime<Utc>>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub inference_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tts_ms: Option<u64>,
    pub inference_ms: Option<u64>,
}

impl TaskTimings {
    pub fn total_s(&self) -> Option<f64> {
        let start = self.preprocessing_at.or(self.queued_at)?;
        let end = self.completed_at?;
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}

/// Terminal result payload. Populated only once a task reaches a terminal phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub output_path: Option<PathBuf>,
    pub output_url: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
}

/// A single client request moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub text: String,
    pub normalized_text: Option<String>,
    pub video_path: Option<PathBuf>,
    pub reference_audio_path: Option<PathBuf>,
    pub generated_audio_path: Option<PathBuf>,
    pub gpu_id: Option<u32>,
    pub phase: TaskPhase,
    pub timings: TaskTimings,
    pub progress_pct: u8,
    pub outcome: TaskOutcome,
    pub tts_degraded: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: String, text: String) -> Self {
        Self {
            id,
            text,
            normalized_text: None,
            video_path: None,
            reference_audio_path: None,
            generated_audio_path: None,
            gpu_id: None,
            phase: TaskPhase::Accepted,
            timings: TaskTimings::default(),
            progress_pct: 0,
            outcome: TaskOutcome::default(),
            tts_degraded: false,
            created_at: Utc::now(),
        }
    }

    pub fn mark_failed(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.phase = TaskPhase::Failed;
        self.outcome.error_kind = Some(kind);
        self.outcome.error_message = Some(message.into());
    }

    pub fn mark_timeout(&mut self) {
        self.phase = TaskPhase::Timeout;
        self.outcome.error_kind = Some(ErrorKind::Timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_accepted_with_no_outcome() {
        let t = Task::new("t1".into(), "hello".into());
        assert_eq!(t.phase, TaskPhase::Accepted);
        assert!(t.outcome.error_kind.is_none());
        assert!(!t.tts_degraded);
    }

    #[test]
    fn terminal_phases_are_recognized() {
        assert!(TaskPhase::Completed.is_terminal());
        assert!(TaskPhase::Failed.is_terminal());
        assert!(TaskPhase::Timeout.is_terminal());
        assert!(!TaskPhase::Monitoring.is_terminal());
    }

    #[test]
    fn reservation_holding_phases_cover_the_driver_run() {
        assert!(TaskPhase::Reserving.holds_reservation());
        assert!(TaskPhase::Monitoring.holds_reservation());
        assert!(!TaskPhase::Queued.holds_reservation());
        assert!(!TaskPhase::Completed.holds_reservation());
    }

    #[test]
    fn mark_failed_sets_terminal_outcome() {
        let mut t = Task::new("t1".into(), "hi".into());
        t.mark_failed(ErrorKind::BackendFailed, "boom");
        assert_eq!(t.phase, TaskPhase::Failed);
        assert_eq!(t.outcome.error_kind, Some(ErrorKind::BackendFailed));
        assert_eq!(t.outcome.error_message.as_deref(), Some("boom"));
    }
}
