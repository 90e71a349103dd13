use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What runtime a container needs (spec §4.5): `runc` unless the execution
/// engine demands GPUs, in which case `nvidia`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Runtime {
    Runc,
    Nvidia,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub key: String,
    /// An opaque reference when the value was hoisted to the secret store,
    /// otherwise the literal value inlined by the Scheduler.
    pub value: serde_json::Value,
    pub mount: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub key: String,
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackUrls {
    pub input: String,
    pub main: String,
    pub output: String,
}

/// Everything a node agent needs to start one batch. Built by the Scheduler
/// from the batch's experiment (image, resolved command line) and its
/// resolved secrets (spec §4.5, §4.7 Phase A).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub batch_id: String,
    pub image: String,
    pub command: Vec<String>,
    pub inputs: Vec<InputDescriptor>,
    pub outputs: Vec<OutputDescriptor>,
    pub runtime: Runtime,
    pub mount: bool,
    pub ram_mb: u64,
    pub gpu_ids: Vec<String>,
    pub callback_urls: CallbackUrls,
    pub callback_token: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
    Accepted,
    Rejected(String),
    TransportFailure,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ProbeResult {
    pub alive: bool,
    #[serde(default)]
    pub ram_free_mb: Option<u64>,
    #[serde(default)]
    pub gpus_free: Option<Vec<String>>,
    /// Set when the agent has no record of the batch at all (spec §4.7
    /// Phase R: "returns `unknown` for the batch").
    #[serde(default)]
    pub unknown_batches: Vec<String>,
}
