use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::red::{ContainerSettings, ExecutionSettings};

/// An accepted experiment. Immutable after creation (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub username: String,
    pub container: ContainerSettings,
    pub execution: ExecutionSettings,
    pub notifications: Vec<String>,
    pub registration_time: DateTime<Utc>,
}
