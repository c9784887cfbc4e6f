//! Error handling and classification module
//!
//! [`ClientError`] is the single error type returned by the backend client and
//! the poll session. Each variant is classified into an [`ErrorCategory`] so the
//! session can decide between backing off and stopping.

pub mod classification;

use thiserror::Error;

pub use classification::{
    ErrorCategory, FatalReason, RecoveryHint, TimeoutReason, TransientReason, UsageLimitReason,
};

/// Errors produced while talking to the model-building backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The request never produced an HTTP response.
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// The request exceeded the configured timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The body could not be decoded into the expected shape.
    #[error("malformed payload from {endpoint}: {message}")]
    MalformedPayload {
        endpoint: &'static str,
        message: String,
    },

    /// The backend reported a stage name outside the fixed mapping.
    #[error("unknown stage `{0}`")]
    UnknownStage(String),

    /// The configured base URL cannot be used to build request URLs.
    #[error("invalid base url `{0}`")]
    InvalidBaseUrl(String),

    /// The poll loop hit its configured budget without finishing.
    #[error("gave up after {0} polls without a finished deployment")]
    PollBudgetExhausted(u32),

    /// The session was cancelled before the operation finished.
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Build a [`ClientError::MalformedPayload`] from any displayable cause.
    pub fn malformed(endpoint: &'static str, cause: impl std::fmt::Display) -> Self {
        ClientError::MalformedPayload {
            endpoint,
            message: cause.to_string(),
        }
    }

    /// Convert a reqwest transport error, keeping timeouts distinct.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout {
                url: url.to_string(),
            }
        } else {
            ClientError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Classify this error for the retry strategy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Network { .. } => ErrorCategory::Transient(TransientReason::NetworkError),
            ClientError::Timeout { .. } => ErrorCategory::Timeout(TimeoutReason::RequestTimeout),
            ClientError::HttpStatus { status, .. } => match *status {
                429 => ErrorCategory::UsageLimit(UsageLimitReason::RateLimited),
                502..=504 => ErrorCategory::Transient(TransientReason::ServiceUnavailable),
                500..=599 => ErrorCategory::Transient(TransientReason::ServerError),
                404 => ErrorCategory::Fatal(FatalReason::ResourceNotFound),
                _ => ErrorCategory::Fatal(FatalReason::InvalidRequest),
            },
            ClientError::MalformedPayload { .. } => {
                ErrorCategory::Fatal(FatalReason::MalformedPayload)
            }
            ClientError::UnknownStage(_) => ErrorCategory::Fatal(FatalReason::UnknownStage),
            ClientError::InvalidBaseUrl(_) => {
                ErrorCategory::Fatal(FatalReason::ConfigurationError)
            }
            ClientError::PollBudgetExhausted(_) => {
                ErrorCategory::Fatal(FatalReason::BudgetExhausted)
            }
            ClientError::Cancelled => ErrorCategory::Fatal(FatalReason::Cancelled),
        }
    }
}

/// Result alias for backend operations.
pub type ClientResult<T> = Result<T, ClientError>;
