//! Error types shared by the sync engine, remote client and orchestrator.

/// Result type for library operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while talking to the remote store or submitting entries.
///
/// A merge that changes nothing is not an error; it is reported through
/// [`MergeResult::changed_count`](crate::merge::MergeResult::changed_count).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Missing identifiers or credentials, detected before any network call
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection failure, timeout or non-2xx response
    #[error("{}", format_transport(.status, .detail))]
    Transport { status: Option<u16>, detail: String },

    /// Response body could not be decoded
    #[error("Unexpected response format: {0}")]
    Format(String),

    /// Caller supplied nothing to work with
    #[error("Usage error: {0}")]
    Usage(String),
}

fn format_transport(status: &Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("Remote store error ({}): {}", code, detail),
        None => format!("Remote store unreachable: {}", detail),
    }
}

impl SyncError {
    /// Build a transport error from an HTTP status and response body
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        SyncError::Transport {
            status: Some(status),
            detail: body.into(),
        }
    }

    /// Whether a retry could plausibly succeed (network failure or 5xx)
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { status: None, .. } => true,
            SyncError::Transport {
                status: Some(code), ..
            } => *code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport {
            status: err.status().map(|s| s.as_u16()),
            detail: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Format(err.to_string())
    }
}

impl From<base64::DecodeError> for SyncError {
    fn from(err: base64::DecodeError) -> Self {
        SyncError::Format(format!("invalid base64 content: {}", err))
    }
}
