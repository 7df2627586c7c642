use std::fmt;

use archiver_core::TransitionError;
use thiserror::Error;

use crate::persist::PersistError;
use crate::render::RenderError;

/// Parsed response body of a successful API call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    Json(serde_json::Value),
    Text(String),
    Empty,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("unauthorized: the token is invalid or expired")]
    Unauthorized,
    #[error("forbidden: missing permission for {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("api error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Timeouts, connection failures and server errors may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout(_) | ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Credential or permission problems the user has to fix.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::Forbidden(_))
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::Timeout(err.to_string());
    }
    ApiError::Network(err.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadFailure {
    HttpStatus(u16),
    Timeout,
    Network(String),
    Io(String),
}

impl fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadFailure::HttpStatus(code) => write!(f, "http status {code}"),
            DownloadFailure::Timeout => write!(f, "timeout"),
            DownloadFailure::Network(msg) => write!(f, "network error: {msg}"),
            DownloadFailure::Io(msg) => write!(f, "filesystem error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("download of {url} failed: {cause}")]
pub struct DownloadError {
    pub url: String,
    pub cause: DownloadFailure,
}

impl DownloadError {
    pub(crate) fn new(url: &str, cause: DownloadFailure) -> Self {
        Self {
            url: url.to_string(),
            cause,
        }
    }

    pub(crate) fn io(url: &str, err: std::io::Error) -> Self {
        Self::new(url, DownloadFailure::Io(err.to_string()))
    }
}

/// Errors that end an export job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not prepare export directory: {0}")]
    Directory(#[source] PersistError),
    #[error("failed to fetch batch {batch} after retry: {source}")]
    Fetch {
        batch: u32,
        #[source]
        source: ApiError,
    },
    #[error("failed to persist batch {batch}: {source}")]
    Persist {
        batch: u32,
        #[source]
        source: PersistError,
    },
    #[error("could not write status marker: {0}")]
    Marker(#[source] PersistError),
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("export task aborted: {0}")]
    Panicked(String),
}
