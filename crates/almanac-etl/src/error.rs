//! Error types for the harvest pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while fetching, classifying or writing.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The source could not be reached or answered with a server error.
    #[error("{source_name} unavailable: {message}")]
    Unavailable {
        source_name: String,
        message: String,
        status: Option<u16>,
    },

    /// The source returned a rate-limit response.
    #[error("rate limited by {source_name}")]
    RateLimited {
        source_name: String,
        retry_after: Option<Duration>,
    },

    /// The source refused the request because of its size or shape.
    #[error("{source_name} rejected the request: {message}")]
    QueryRejected {
        source_name: String,
        message: String,
        status: Option<u16>,
    },

    /// Any other non-success status (401, 403, 404, ...).
    #[error("{source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },

    /// The response was not JSON.
    #[error("unexpected content type from {source_name}: {content_type}")]
    UnexpectedContentType {
        source_name: String,
        content_type: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed response from {source_name}: {message}")]
    Malformed {
        source_name: String,
        message: String,
    },

    /// An error propagated from `reqwest` outside of a request (e.g. while
    /// building the client).
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// An error propagated from the core domain layer.
    #[error(transparent)]
    Core(#[from] almanac_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl HarvestError {
    /// Returns `true` when the error is transient and the operation may
    /// succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::RateLimited { .. })
    }

    /// Returns `true` when the request should be retried in smaller pieces.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::QueryRejected { .. })
    }

    /// Minimum wait requested by the source, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The HTTP status behind the error, when the source answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Unavailable { status, .. } | Self::QueryRejected { status, .. } => *status,
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience alias for pipeline results.
pub type HarvestResult<T> = std::result::Result<T, HarvestError>;
