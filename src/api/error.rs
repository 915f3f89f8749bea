use thiserror::Error;

/// Failures talking to the remote system of record. All of them are
/// transient from the engine's point of view: the drain pass aborts and
/// the queue is retried on the next trigger.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    #[error("Invalid payload: {0}")]
    ParseError(String),

    #[error("Remote store rejected request: {status} - {message}")]
    RemoteRejected { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Connectivity lost")]
    Offline,
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::ParseError(err.to_string())
    }
}
