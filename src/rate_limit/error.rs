//! Rate Limiting Error Types

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::tracker::TrackerKey;

/// Errors raised by a quota store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Tracker does not exist
    #[error("Quota tracker not found: {0}")]
    NotFound(TrackerKey),

    /// Backing file could not be read or written
    #[error("Quota store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing file holds malformed data
    #[error("Quota store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned when executing work through the rate limiting service
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// Local quota for the tracker is used up; nothing was executed
    #[error("Quota exceeded for {key}; resets at {reset_at}")]
    QuotaExceeded {
        key: TrackerKey,
        reset_at: DateTime<Utc>,
    },

    /// The external platform signalled throttling
    #[error("Rate limit exceeded, retry after {}s: {message}", .retry_after.as_secs())]
    RateLimitExceeded { retry_after: Duration, message: String },

    /// The unit of work did not finish in time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Quota store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Any other error from the unit of work, passed through unchanged
    #[error(transparent)]
    Request(anyhow::Error),
}

impl QuotaError {
    /// Whether this is a local quota rejection
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, QuotaError::QuotaExceeded { .. })
    }

    /// Whether the platform itself throttled the call
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, QuotaError::RateLimitExceeded { .. })
    }

    /// Suggested wait before retrying, if known
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            QuotaError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            QuotaError::QuotaExceeded { reset_at, .. } => {
                Some((*reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            }
            _ => None,
        }
    }
}
