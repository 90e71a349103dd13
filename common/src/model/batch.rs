use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::FailureReason;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BatchState {
    Registered,
    Scheduled,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchState::Succeeded | BatchState::Failed | BatchState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchState::Registered => "registered",
            BatchState::Scheduled => "scheduled",
            BatchState::Processing => "processing",
            BatchState::Succeeded => "succeeded",
            BatchState::Failed => "failed",
            BatchState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "registered" => BatchState::Registered,
            "scheduled" => BatchState::Scheduled,
            "processing" => BatchState::Processing,
            "succeeded" => BatchState::Succeeded,
            "failed" => BatchState::Failed,
            "cancelled" => BatchState::Cancelled,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: BatchState,
    pub time: DateTime<Utc>,
    pub debug_info: Vec<String>,
    pub node: Option<String>,
}

/// One concrete invocation: a unit of scheduling (spec §3).
///
/// Mutated exclusively by the Controller (via compare-and-set updates keyed
/// by `(id, expected_state)`) and by the Broker's callback handler. Terminal
/// states are sticky: once `state.is_terminal()`, no further transition is
/// ever applied (invariant 4).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub username: String,
    pub batch_index: u32,
    pub state: BatchState,
    pub node: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub protected_keys_voided: bool,
    pub notifications_sent: bool,
    pub attempts: u32,
    pub registration_time: DateTime<Utc>,
    pub inputs: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, Value>,
    /// Populated once a callback token is handed to a launched batch.
    pub secret_bundle_id: Option<String>,
    /// Physical GPU ids committed on `node` for this batch, set by
    /// `cas_admit` alongside `node` and cleared by `clear_batch_node`.
    /// Persisted (not just held in the Controller's process memory) so a
    /// restart can still release exactly what was reserved.
    #[serde(default)]
    pub gpu_ids: Vec<String>,
}

impl Batch {
    pub fn push_history(&mut self, state: BatchState, debug_info: Vec<String>, now: DateTime<Utc>) {
        self.history.push(HistoryEntry {
            state,
            time: now,
            debug_info,
            node: self.node.clone(),
        });
        self.state = state;
    }

    pub fn last_failure_reason(&self) -> Option<&str> {
        self.history
            .last()
            .filter(|h| h.state == BatchState::Failed)
            .and_then(|h| h.debug_info.first())
            .map(|s| s.as_str())
    }
}

/// Classifies a just-observed failure into a `FailureReason`, the canonical
/// single place callers (Scheduler phases) build the enum from a string
/// reason code, keeping `Batch::history` debug strings and retry logic in
/// sync.
pub fn classify(reason_code: &str, message: &str, disable_retry: bool) -> FailureReason {
    match reason_code {
        "node_lost" => FailureReason::NodeLost,
        "launch_rejected" => FailureReason::LaunchRejected(message.to_string()),
        "launch_attempts_exhausted" => FailureReason::LaunchAttemptsExhausted,
        "secret" => FailureReason::Secret {
            message: message.to_string(),
            disable_retry,
        },
        "agent" => FailureReason::Agent {
            message: message.to_string(),
            disable_retry,
        },
        "cancelled" => FailureReason::Cancelled,
        _ => FailureReason::Validation(message.to_string()),
    }
}

/// Reconstructs a `FailureReason` from a history entry's persisted
/// `FailureReason::debug_string()`, the inverse of that encoding. This is
/// what lets `disable_retry` on a `Secret`/`Agent` failure survive a
/// Controller restart: without it, a retryable callback-reported failure
/// would come back as non-retryable `Validation` and never retry.
pub fn parse_failure_reason(debug_string: &str) -> FailureReason {
    if debug_string == "node_lost" {
        return classify("node_lost", "", false);
    }
    if debug_string == "launch_attempts_exhausted" {
        return classify("launch_attempts_exhausted", "", false);
    }
    if debug_string == "cancelled" {
        return classify("cancelled", "", false);
    }
    if let Some(message) = debug_string.strip_prefix("launch_rejected: ") {
        return classify("launch_rejected", message, false);
    }
    if let Some(rest) = debug_string.strip_prefix("secret_failure[disable_retry=") {
        let (disable_retry, message) = split_disable_retry(rest);
        return classify("secret", message, disable_retry);
    }
    if let Some(rest) = debug_string.strip_prefix("agent_error[disable_retry=") {
        let (disable_retry, message) = split_disable_retry(rest);
        return classify("agent", message, disable_retry);
    }
    if let Some(message) = debug_string.strip_prefix("validation: ") {
        return classify("validation", message, false);
    }
    classify("", debug_string, false)
}

fn split_disable_retry(rest: &str) -> (bool, &str) {
    match rest.split_once("]: ") {
        Some(("true", message)) => (true, message),
        Some((_, message)) => (false, message),
        None => (false, rest),
    }
}
