use thiserror::Error;

/// Errors talking to AO3.
///
/// `is_retryable()` separates transient failures (throttling, server errors,
/// dropped connections) from ones another attempt cannot fix.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error fetching {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Unexpected page at {url}: {reason}")]
    Parse { url: String, reason: String },
}

impl RemoteError {
    pub(crate) fn http(url: &str, source: reqwest::Error) -> Self {
        RemoteError::Http {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn parse(url: &str, reason: impl Into<String>) -> Self {
        RemoteError::Parse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is transient and worth retrying.
    ///
    /// AO3 answers bursts with 429 and overload with 502/503/525, all of which
    /// clear up after a pause.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            RemoteError::Http { .. } => true,
            RemoteError::Auth(_) => false,
            RemoteError::Parse { .. } => false,
        }
    }
}
