//! Stable internal representation of an accepted RED document.
//!
//! Replaces the original's dynamically-typed dict-of-dicts (spec §9 redesign)
//! with a small closed set of tagged variants. The Broker's intake handler is
//! the only place this type is constructed from untrusted JSON; everything
//! downstream works with `RedDocument`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An input or output value: either a literal, inlined value, or a
/// connector-backed value fetched/pushed by a side program at run time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum Connectable {
    #[serde(rename = "Directory")]
    Literal { value: Value },
    #[serde(rename = "File")]
    Connector {
        connector: ConnectorSpec,
        #[serde(default)]
        mount: bool,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectorSpec {
    pub command: String,
    #[serde(default)]
    pub access: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpuRequirement {
    pub count: u32,
    pub vram_min_mb: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerSettings {
    #[serde(default = "ContainerSettings::default_engine")]
    pub engine: String,
    pub image: String,
    pub ram_mb: u64,
    #[serde(default)]
    pub gpus: Option<GpuRequirement>,
}

impl ContainerSettings {
    /// Only container engine this deployment supports (spec §4.2). Modeled
    /// on `cc-core/cc_core/commons/engines.py`'s `container_engines` map,
    /// which today has exactly one entry, `docker`.
    pub const SUPPORTED_ENGINE: &'static str = "docker";

    fn default_engine() -> String {
        Self::SUPPORTED_ENGINE.to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionSettings {
    pub engine: String,
    #[serde(default)]
    pub retry_if_failed: bool,
    pub batch_concurrency_limit: u32,
    #[serde(default)]
    pub access_url: Option<String>,
}

/// One entry of the RED `batches` array: per-batch overrides layered on top
/// of the document's top-level `inputs`/`outputs`.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RedBatch {
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

/// A validated, structurally-sound RED document as accepted by `POST /red`.
///
/// Pre-conditions enforced by the (out-of-scope) RED-document validator
/// before this type is constructed: `execution.engine == "ccagency"`, the
/// container engine is one this deployment supports, and every protected
/// key's value has already been classified as a secret candidate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedDocument {
    pub container: ContainerSettings,
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub batches: Vec<RedBatch>,
    #[serde(default)]
    pub notifications: Vec<NotificationSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationSpec {
    pub url: String,
}

impl RedDocument {
    /// Number of batches this document expands into: the `batches` array's
    /// length, or 1 for a single-batch RED (spec §4.2).
    pub fn batch_count(&self) -> usize {
        self.batches.len().max(1)
    }

    pub const SUPPORTED_ENGINE: &'static str = "ccagency";
}
