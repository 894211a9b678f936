use thiserror::Error;

/// Errors from a single backend call.
///
/// The pipeline turns each of these into one user-visible sentence; the
/// variant detail goes to the log only.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection refused, DNS failure, reset, etc.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The backend answered with a non-2xx status.
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    /// The backend answered `{ "error": "..." }`.
    #[error("backend reported: {0}")]
    Server(String),

    /// The JSON response lacked a required field.
    #[error("response has no `{0}` field")]
    MissingField(&'static str),

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The request itself could not be built (bad MIME type, bad URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A local file referenced by the configuration could not be read.
    #[error("failed to read {path}: {message}")]
    File { path: String, message: String },
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_decode() {
            BackendError::Malformed(e.to_string())
        } else if e.is_builder() {
            BackendError::InvalidRequest(e.to_string())
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

impl BackendError {
    /// `true` for failures where no HTTP response was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Network(_) | BackendError::Timeout)
    }
}
