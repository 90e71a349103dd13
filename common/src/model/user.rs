use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered broker user. Created by the `agency-tools` bootstrap
/// subcommands; never mutated by the Broker or Controller beyond password
/// changes routed through `Auth`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Salted KDF digest, hex-encoded.
    pub verifier: String,
    /// Salt used to derive `verifier`, hex-encoded.
    pub salt: String,
    pub is_admin: bool,
}

/// One failed-verification record used to throttle auth attempts (spec §4.1).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockEntry {
    pub ip: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

impl BlockEntry {
    pub fn key(ip: &str, username: &str) -> String {
        format!("{ip}:{username}")
    }
}
