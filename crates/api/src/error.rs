//! Errors surfaced by Assessment API clients.

use exam_core::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("not found")]
    NotFound,

    #[error("not authorized")]
    Unauthorized,

    #[error("server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid base url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// Whether retrying the same call later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Unavailable(_) | Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
