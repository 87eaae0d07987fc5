//! Errors from the rewriting collaborator
//!
//! The pipeline never propagates these: the Display text of the final error
//! for a chunk becomes that chunk's error marker.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Client could not be built (unknown provider, missing key)
    #[error("LLM client not configured: {0}")]
    Unconfigured(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Non-success HTTP status with the response body
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether another attempt at the same request can succeed
    ///
    /// 408, 429 and 5xx statuses are transient; other statuses mean the
    /// request itself was rejected.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::ApiError { status, .. } => matches!(status, 408 | 429) || (500..600).contains(status),
            Self::Unconfigured(_) | Self::InvalidResponse(_) | Self::Json(_) => false,
        }
    }

    /// Server-requested delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> LlmError {
        LlmError::ApiError {
            status: code,
            message: String::new(),
        }
    }

    #[test]
    fn test_transient_statuses_retry() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(status(code).is_retryable(), "{} should retry", code);
        }
        for code in [400, 401, 403, 404, 422] {
            assert!(!status(code).is_retryable(), "{} should not retry", code);
        }
    }

    #[test]
    fn test_client_side_errors_do_not_retry() {
        assert!(LlmError::Timeout(Duration::from_secs(300)).is_retryable());
        assert!(!LlmError::Unconfigured("no key".to_string()).is_retryable());
        assert!(!LlmError::InvalidResponse("no choices".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let limited = LlmError::RateLimited {
            retry_after: Duration::from_secs(7),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(status(503).retry_after(), None);
    }

    #[test]
    fn test_display_is_marker_text() {
        assert_eq!(
            LlmError::ApiError {
                status: 402,
                message: "Insufficient Balance".to_string()
            }
            .to_string(),
            "API error 402: Insufficient Balance"
        );
    }
}
