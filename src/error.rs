// Error types for the reservation core. Read-path gateway failures are
// absorbed into degraded responses; only reservation commits surface errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Errors from the PMS gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transient upstream error: {0}")]
    Transient(String),

    #[error("Upstream request timed out after {0}ms")]
    Timeout(u64),

    #[error("Upstream PMS unavailable (circuit open), retry after {retry_after_ms}ms")]
    UpstreamUnavailable { retry_after_ms: u64 },

    #[error("Reservation commit failed: {0}")]
    CommitFailed(String),

    #[error("Invalid reservation draft: missing {0}")]
    InvalidDraft(&'static str),

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}

impl GatewayError {
    // Transient and timeout failures are safe to retry on the read path
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_) | GatewayError::Timeout(_))
    }
}

// Errors from the lock manager. A release by a non-owner is not an error,
// release just returns false.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Timed out acquiring lock on {resource_id} after {waited_ms}ms")]
    Timeout { resource_id: String, waited_ms: u64 },
}

// Errors from the workflow engine
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Unknown workflow: {0}")]
    NotFound(String),

    #[error("Workflow {0} already reached a terminal state")]
    Terminal(String),

    #[error("Booking resource {0} is busy, retry the request")]
    LockBusy(String),
}

// A user-correctable rule violation. These are returned in lists and never
// abort the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRuleViolation {
    pub rule: String,
    pub message: String,
}

impl BusinessRuleViolation {
    pub fn new(rule: &str, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_errors_are_retryable_commit_errors_are_not() {
        assert!(GatewayError::Transient("503".to_string()).is_retryable());
        assert!(GatewayError::Timeout(2000).is_retryable());
        assert!(!GatewayError::CommitFailed("500".to_string()).is_retryable());
        assert!(!GatewayError::UpstreamUnavailable { retry_after_ms: 1000 }.is_retryable());
    }

    #[test]
    fn violation_serializes_with_rule_code() {
        let v = BusinessRuleViolation::new(
            "checkout_after_checkin",
            "Check-out date must be after check-in date",
        );
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("checkout_after_checkin"));
    }
}
