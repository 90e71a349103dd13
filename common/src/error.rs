//! The abstract error-kind taxonomy shared across crates (spec §7).
//!
//! Each crate still defines its own `thiserror` boundary error (`StoreError`,
//! `SecretError`, ...); this enum is what those get folded into once they
//! reach the Scheduler or the Broker, where retryability and HTTP status
//! are decided.

use thiserror::Error;

/// A reason a batch failed, carried in its terminal history entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// Malformed RED document, unsupported engine, schema violation.
    Validation(String),
    /// Node agent unreachable past `nodeTimeoutSec`, or reported unknown.
    NodeLost,
    /// `NodeAgentClient::launch` returned `rejected`.
    LaunchRejected(String),
    /// Exhausted `maxLaunchAttempts` transport failures.
    LaunchAttemptsExhausted,
    /// `SecretClient` failure; `disable_retry` decides stickiness.
    Secret { message: String, disable_retry: bool },
    /// Reported via an agent callback; `disable_retry` comes from the payload.
    Agent { message: String, disable_retry: bool },
    /// Explicit user cancellation.
    Cancelled,
}

impl FailureReason {
    /// Whether a batch failed for this reason may be retried, subject to
    /// `execution.settings.retryIfFailed` and the attempt cap (spec §4.7).
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureReason::Validation(_) => false,
            FailureReason::NodeLost => true,
            FailureReason::LaunchRejected(_) => false,
            FailureReason::LaunchAttemptsExhausted => true,
            FailureReason::Secret { disable_retry, .. } => !disable_retry,
            FailureReason::Agent { disable_retry, .. } => !disable_retry,
            FailureReason::Cancelled => false,
        }
    }

    /// Persisted into the batch's terminal history entry. `Secret`/`Agent`
    /// encode `disable_retry` inline (`"agent_error[disable_retry=false]:
    /// ..."`) so `common::model::batch::parse_failure_reason` can recover a
    /// retry-eligible reason from history alone after a Controller restart,
    /// instead of only ever reconstructing a non-retryable `Validation`.
    pub fn debug_string(&self) -> String {
        match self {
            FailureReason::Validation(m) => format!("validation: {m}"),
            FailureReason::NodeLost => "node_lost".to_string(),
            FailureReason::LaunchRejected(m) => format!("launch_rejected: {m}"),
            FailureReason::LaunchAttemptsExhausted => "launch_attempts_exhausted".to_string(),
            FailureReason::Secret { message, disable_retry } => {
                format!("secret_failure[disable_retry={disable_retry}]: {message}")
            }
            FailureReason::Agent { message, disable_retry } => {
                format!("agent_error[disable_retry={disable_retry}]: {message}")
            }
            FailureReason::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Surfaced at the Broker's HTTP boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}
