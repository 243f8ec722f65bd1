use voice_agent_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("submit rejected: {0}")]
    SubmitRejected(String),
    #[error("query transport error: {0}")]
    QueryTransient(String),
    #[error("backend reported failure: {0}")]
    BackendFailed(String),
    #[error("tts call failed: {0}")]
    Tts(String),
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<&ClientError> for ErrorKind {
    fn from(err: &ClientError) -> Self {
        match err {
            ClientError::SubmitRejected(_) => ErrorKind::SubmitRejected,
            ClientError::QueryTransient(_) => ErrorKind::QueryTransient,
            ClientError::BackendFailed(_) => ErrorKind::BackendFailed,
            ClientError::Tts(_) => ErrorKind::TtsError,
            ClientError::Transport(_) => ErrorKind::QueryTransient,
        }
    }
}

impl From<ClientError> for ErrorKind {
    fn from(err: ClientError) -> Self {
        ErrorKind::from(&err)
    }
}
