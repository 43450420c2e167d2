/// Top-level error type for the workflow client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowClientError {
    /// Invalid client configuration (base URL, workflow name, buffer size).
    #[error("config error: {0}")]
    Config(String),
    /// The request could not be sent or its body could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// The engine answered with a non-success HTTP status.
    #[error("workflow engine returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// The engine answered successfully but with an unexpected body.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// `RunHandle::watch` was called more than once for the same run.
    #[error("run is already being watched")]
    AlreadyWatching,
    /// `RunHandle::finish` was called before the stream watcher was attached.
    #[error("run is not being watched")]
    NotWatching,
}

impl WorkflowClientError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a protocol-level error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the HTTP status for `Status` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
