use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CallbackPhase {
    Input,
    Main,
    Output,
}

impl CallbackPhase {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "input" => CallbackPhase::Input,
            "main" => CallbackPhase::Main,
            "output" => CallbackPhase::Output,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallbackPhase::Input => "input",
            CallbackPhase::Main => "main",
            CallbackPhase::Output => "output",
        }
    }
}

/// One per `(batch, phase)`, issued at scheduling time. Single-use: the
/// first accepted callback for a phase marks the token used (spec §3, §4.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackToken {
    pub batch_id: Uuid,
    pub phase: CallbackPhase,
    pub token: String,
    pub used: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallbackResultState {
    Succeeded,
    Failed,
}

/// The union of the three callback schemas named in the glossary
/// (`agent_result`, `inputconnector_result`, `outputconnector_result`).
/// Each phase only populates the fields relevant to it; unused fields stay
/// `None`/empty, matching the original's per-phase JSON-schema `required`
/// sets instead of forcing one shape on all three.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub state: CallbackResultState,
    #[serde(default)]
    pub inputs: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub outputs: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub debug_info: Vec<String>,
    #[serde(default)]
    pub return_code: Option<i32>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub executed: bool,
    /// Set when the agent reports a classified error; absent means the
    /// failure (if any) is not retryable-by-default.
    #[serde(default)]
    pub disable_retry: Option<bool>,
}

impl CallbackPayload {
    /// Validates the payload carries the fields the given phase requires
    /// (spec glossary: callback schemas).
    pub fn validate_for_phase(&self, phase: CallbackPhase) -> Result<(), String> {
        match phase {
            CallbackPhase::Input => {
                if self.state == CallbackResultState::Succeeded && self.inputs.is_none() {
                    return Err("input callback missing 'inputs'".to_string());
                }
            }
            CallbackPhase::Output => {
                if self.state == CallbackResultState::Succeeded && self.outputs.is_none() {
                    return Err("output callback missing 'outputs'".to_string());
                }
            }
            CallbackPhase::Main => {}
        }
        Ok(())
    }
}
