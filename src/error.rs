use thiserror::Error;

/// Evidence intake client errors
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-success HTTP response from the intake API
    #[error("Request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level failures (connection refused, DNS, TLS, timeouts)
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No pending files in the queue when an upload was requested
    #[error("No pending files to upload")]
    NothingToUpload,

    /// A batch upload is already in flight
    #[error("An upload is already in progress")]
    UploadInProgress,

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl IntakeError {
    /// HTTP status code, when the error came from a server response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            IntakeError::Http { status, .. } => Some(*status),
            IntakeError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Banner and CLI output only ever need the rendered message
impl From<IntakeError> for String {
    fn from(err: IntakeError) -> String {
        err.to_string()
    }
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, IntakeError>;
}

impl<T, E: Into<IntakeError>> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: &str) -> Result<T, IntakeError> {
        self.map_err(|e| match e.into() {
            IntakeError::Config(s) => IntakeError::Config(format!("{}: {}", msg, s)),
            IntakeError::Other(s) => IntakeError::Other(format!("{}: {}", msg, s)),
            // Source-carrying variants keep their source; context goes in Other
            other @ (IntakeError::Io(_) | IntakeError::Json(_) | IntakeError::Transport(_)) => {
                IntakeError::Other(format!("{}: {}", msg, other))
            }
            other => other,
        })
    }
}
