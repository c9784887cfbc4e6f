//! Error classification types for the polling client
//!
//! Every [`ClientError`](super::ClientError) maps to a category that decides
//! whether the poll loop retries, backs off, or gives up and shows the error.

use std::time::Duration;

/// The primary category of an error, determining the general recovery strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary errors that may resolve on retry (connection refused, 5xx).
    Transient(TransientReason),
    /// The backend asked the client to slow down.
    UsageLimit(UsageLimitReason),
    /// Unrecoverable errors; the session stops and surfaces the error.
    Fatal(FatalReason),
    /// The request did not complete in time.
    Timeout(TimeoutReason),
}

/// Reasons for transient errors that may resolve on retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransientReason {
    /// Network connectivity issues (DNS, TCP, TLS).
    NetworkError,
    /// Service temporarily unavailable (HTTP 502/503/504).
    ServiceUnavailable,
    /// Server-side error that may be temporary (other HTTP 5xx).
    ServerError,
}

/// Reasons for usage limit errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageLimitReason {
    /// Rate limit exceeded (HTTP 429).
    RateLimited,
}

/// Reasons for fatal errors that cannot be automatically recovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FatalReason {
    /// The backend rejected the request (HTTP 4xx other than 429).
    InvalidRequest,
    /// The endpoint does not exist on the configured backend (HTTP 404).
    ResourceNotFound,
    /// The response body did not match the expected shape.
    MalformedPayload,
    /// The backend reported a stage outside the known four.
    UnknownStage,
    /// The client configuration cannot produce a valid request.
    ConfigurationError,
    /// The poll budget ran out before the backend finished.
    BudgetExhausted,
    /// The session was cancelled by the user.
    Cancelled,
}

/// Reasons for timeout errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeoutReason {
    /// HTTP request timed out waiting for response.
    RequestTimeout,
}

/// Hints for how to recover from an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryHint {
    /// Retry after a backoff delay chosen by the retry strategy.
    RetryWithBackoff,
    /// Retry after a specified duration.
    RetryAfter(Duration),
    /// Stop the session and wait for the user to reset.
    WaitForUser,
    /// Stop silently; nothing needs to be shown.
    StopExecution,
}

impl ErrorCategory {
    /// Returns true if the poll loop may retry an error of this category.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCategory::Fatal(_))
    }

    /// The default recovery hint for this category.
    pub fn recovery_hint(&self) -> RecoveryHint {
        match self {
            ErrorCategory::Transient(_) | ErrorCategory::Timeout(_) => {
                RecoveryHint::RetryWithBackoff
            }
            ErrorCategory::UsageLimit(_) => RecoveryHint::RetryAfter(Duration::from_secs(10)),
            ErrorCategory::Fatal(FatalReason::Cancelled) => RecoveryHint::StopExecution,
            ErrorCategory::Fatal(_) => RecoveryHint::WaitForUser,
        }
    }

    /// Short label shown next to the error in the UI.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Transient(_) => "network",
            ErrorCategory::UsageLimit(_) => "rate limited",
            ErrorCategory::Fatal(FatalReason::MalformedPayload) => "bad payload",
            ErrorCategory::Fatal(FatalReason::UnknownStage) => "unknown stage",
            ErrorCategory::Fatal(_) => "error",
            ErrorCategory::Timeout(_) => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_is_not_retryable() {
        let category = ErrorCategory::Fatal(FatalReason::UnknownStage);
        assert!(!category.is_retryable());
        assert_eq!(category.recovery_hint(), RecoveryHint::WaitForUser);
    }

    #[test]
    fn test_transient_and_timeout_back_off() {
        let transient = ErrorCategory::Transient(TransientReason::NetworkError);
        let timeout = ErrorCategory::Timeout(TimeoutReason::RequestTimeout);
        assert!(transient.is_retryable());
        assert!(timeout.is_retryable());
        assert_eq!(transient.recovery_hint(), RecoveryHint::RetryWithBackoff);
        assert_eq!(timeout.recovery_hint(), RecoveryHint::RetryWithBackoff);
    }

    #[test]
    fn test_rate_limit_waits() {
        let category = ErrorCategory::UsageLimit(UsageLimitReason::RateLimited);
        assert!(category.is_retryable());
        assert!(matches!(
            category.recovery_hint(),
            RecoveryHint::RetryAfter(_)
        ));
    }

    #[test]
    fn test_cancelled_stops_quietly() {
        let category = ErrorCategory::Fatal(FatalReason::Cancelled);
        assert_eq!(category.recovery_hint(), RecoveryHint::StopExecution);
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            ErrorCategory::Fatal(FatalReason::MalformedPayload).label(),
            "bad payload"
        );
        assert_eq!(
            ErrorCategory::Transient(TransientReason::ServerError).label(),
            "network"
        );
    }
}
