use voice_agent_core::ErrorKind;

/// Crate-boundary error type for media operations, converted to the shared
/// [`ErrorKind`] taxonomy wherever it crosses into a task outcome.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("audio extraction failed: {0}")]
    Extraction(String),
    #[error("duration probe failed: {0}")]
    Probe(String),
    #[error("staging failed: {0}")]
    Staging(String),
    #[error("output file too small: {0}")]
    TooSmall(String),
    #[error("output file never appeared or never stabilized: {0}")]
    NeverStabilized(String),
    #[error("concat/re-encode failed: {0}")]
    Concat(String),
    #[error("audio split failed: {0}")]
    Split(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<&MediaError> for ErrorKind {
    fn from(err: &MediaError) -> Self {
        match err {
            MediaError::Extraction(_) => ErrorKind::ExtractionError,
            MediaError::Probe(_) => ErrorKind::ExtractionError,
            MediaError::Staging(_) => ErrorKind::StagingError,
            MediaError::TooSmall(_) => ErrorKind::OutputTooSmall,
            MediaError::NeverStabilized(_) => ErrorKind::OutputMissing,
            MediaError::Concat(_) => ErrorKind::ConcatFailure,
            MediaError::Split(_) => ErrorKind::StagingError,
            MediaError::Io(_) => ErrorKind::StagingError,
        }
    }
}

impl From<MediaError> for ErrorKind {
    fn from(err: MediaError) -> Self {
        ErrorKind::from(&err)
    }
}
