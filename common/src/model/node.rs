use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Gpu {
    pub id: String,
    pub vendor: String,
    pub vram_mb: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hardware {
    pub ram_mb: u64,
    pub gpus: Vec<Gpu>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeLiveness {
    Alive,
    Unreachable,
    Unknown,
}

/// A declared container host. Nodes are declared in configuration; the Store
/// mirrors their last observed liveness and resource commitment (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub node_name: String,
    pub url: String,
    pub hardware: Hardware,
    pub liveness: NodeLiveness,
    pub ram_committed_mb: u64,
    /// Ids of GPUs currently assigned to in-flight batches on this node.
    pub gpus_committed: Vec<String>,
}

impl Node {
    pub fn ram_free_mb(&self) -> u64 {
        self.hardware.ram_mb.saturating_sub(self.ram_committed_mb)
    }

    pub fn gpus_free(&self) -> Vec<&Gpu> {
        self.hardware
            .gpus
            .iter()
            .filter(|g| !self.gpus_committed.iter().any(|c| c == &g.id))
            .collect()
    }
}
