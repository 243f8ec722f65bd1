//! Shared error taxonomy.
//!
//! Individual crates define their own `thiserror` error enum at their own
//! boundary (`MediaError`, `ClientError`, `EngineError`, ...); each of those
//! converts into an [`ErrorKind`] here, which is the vocabulary a [`Task`](crate::Task)
//! records and the HTTP surface reports. `ErrorKind` is deliberately not a
//! `std::error::Error` impl over a source chain — it is a closed, serializable
//! classification, not a propagation mechanism.

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, ErrorKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    ExtractionError,
    TtsError,
    StagingError,
    SubmitRejected,
    QueryTransient,
    BackendFailed,
    OutputMissing,
    OutputTooSmall,
    Timeout,
    ConcatFailure,
    InsufficientGpus,
    AdminReset,
}

impl ErrorKind {
    /// Whether this kind is ever recovered locally rather than terminating the task.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::QueryTransient | ErrorKind::TtsError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ExtractionError => "extraction_error",
            ErrorKind::TtsError => "tts_error",
            ErrorKind::StagingError => "staging_error",
            ErrorKind::SubmitRejected => "submit_rejected",
            ErrorKind::QueryTransient => "query_transient",
            ErrorKind::BackendFailed => "backend_failed",
            ErrorKind::OutputMissing => "output_missing",
            ErrorKind::OutputTooSmall => "output_too_small",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConcatFailure => "concat_failure",
            ErrorKind::InsufficientGpus => "insufficient_gpus",
            ErrorKind::AdminReset => "admin_reset",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_recorded_correctly() {
        assert!(ErrorKind::QueryTransient.is_transient());
        assert!(ErrorKind::TtsError.is_transient());
        assert!(!ErrorKind::BackendFailed.is_transient());
    }

    #[test]
    fn round_trips_through_serde() {
        let json = serde_json::to_string(&ErrorKind::InsufficientGpus).unwrap();
        assert_eq!(json, "\"insufficient_gpus\"");
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorKind::InsufficientGpus);
    }
}
