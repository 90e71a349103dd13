//! Shared YAML configuration document, loaded by every binary (spec §6),
//! following `original_source/cc-agency/cc_agency/commons/conf.py`'s single
//! validated document and `backend/src/config.rs`'s `from_env`-style
//! override for the config path.
//!
//! The spec's original `mongo.*` section is renamed `store.*`: the Store
//! crate is relational (`sqlx`, see `DESIGN.md`), not Mongo, so the section
//! carries a connection string rather than discrete host/port/credentials.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_PATH_ENV: &str = "CC_AGENCY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "agency.yml";

#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ControllerConfig {
    pub bind_socket_path: String,
    #[serde(default = "default_scheduling_interval_sec")]
    pub scheduling_interval_sec: u64,
    #[serde(default = "default_node_timeout_sec")]
    pub node_timeout_sec: i64,
    #[serde(default = "default_max_launch_attempts")]
    pub max_launch_attempts: u32,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_rpc_timeout_sec")]
    pub rpc_timeout_sec: u64,
    #[serde(default)]
    pub docker: DockerConfig,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct DockerConfig {
    #[serde(default)]
    pub nodes: Vec<NodeDeclaration>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodeDeclaration {
    #[serde(rename = "nodeName")]
    pub node_name: String,
    pub url: String,
    pub hardware: HardwareDeclaration,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HardwareDeclaration {
    #[serde(rename = "ram")]
    pub ram_mb: u64,
    #[serde(default)]
    pub gpus: Vec<GpuDeclaration>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GpuDeclaration {
    pub id: String,
    #[serde(default = "default_gpu_vendor")]
    pub vendor: String,
    #[serde(rename = "vram")]
    pub vram_mb: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BrokerConfig {
    pub auth: BrokerAuthConfig,
    /// Not in the spec's config table (ambient HTTP-server concern); defaults
    /// to every interface so a bare config file still boots.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// The Broker's externally reachable base URL, embedded in callback URLs
    /// the Scheduler hands to node agents (spec §4.5/§4.7 Phase A). Not in
    /// the spec's literal config table — `bind_addr` alone can't serve this
    /// since it may be `0.0.0.0`, a non-routable bind address.
    pub external_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BrokerAuthConfig {
    pub jwt: JwtConfig,
    #[serde(default = "default_block_window_sec")]
    pub block_window_sec: u64,
    #[serde(default = "default_block_threshold")]
    pub block_threshold: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct JwtConfig {
    /// Absent means derive-and-persist a secret (spec §9 open question 1).
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Where a generated secret is persisted across restarts, when
    /// `secret_key` is absent. Not in the spec's literal config table.
    #[serde(default = "default_key_file")]
    pub key_file: String,
    #[serde(default = "default_access_token_expires")]
    pub access_token_expires: i64,
    /// Unused: JWT refresh/rotation is explicitly out of scope.
    #[serde(default = "default_refresh_token_expires")]
    pub refresh_token_expires: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TrusteeConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub controller: ControllerConfig,
    pub broker: BrokerConfig,
    pub trustee: TrusteeConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: AppConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Resolves the config path: an explicit CLI argument wins, then
    /// `CC_AGENCY_CONFIG`, then the conventional `agency.yml` in the cwd.
    pub fn resolve_path(cli_arg: Option<String>) -> PathBuf {
        cli_arg
            .map(PathBuf::from)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}

fn default_scheduling_interval_sec() -> u64 {
    5
}
fn default_node_timeout_sec() -> i64 {
    30
}
fn default_max_launch_attempts() -> u32 {
    5
}
fn default_retry_limit() -> u32 {
    2
}
fn default_rpc_timeout_sec() -> u64 {
    10
}
fn default_gpu_vendor() -> String {
    "nvidia".to_string()
}
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_key_file() -> String {
    "agency-session.key".to_string()
}
fn default_block_window_sec() -> u64 {
    60
}
fn default_block_threshold() -> u32 {
    3
}
fn default_access_token_expires() -> i64 {
    3600
}
fn default_refresh_token_expires() -> i64 {
    86_400 * 14
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document_with_defaults() {
        let yaml = r#"
store:
  database_url: "sqlite://agency.db"
controller:
  bind_socket_path: "/tmp/agency.sock"
broker:
  auth:
    jwt: {}
  external_url: "http://broker:8080"
trustee:
  url: "http://trustee:8000"
  username: "agency"
  password: "secret"
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.controller.node_timeout_sec, 30);
        assert_eq!(cfg.controller.max_launch_attempts, 5);
        assert_eq!(cfg.broker.auth.block_threshold, 3);
        assert!(cfg.broker.auth.jwt.secret_key.is_none());
    }

    #[test]
    fn parses_declared_nodes() {
        let yaml = r#"
store:
  database_url: "sqlite://agency.db"
controller:
  bind_socket_path: "/tmp/agency.sock"
  docker:
    nodes:
      - nodeName: node-a
        url: "http://node-a:9000"
        hardware:
          ram: 65536
          gpus:
            - id: gpu-0
              vram: 24576
broker:
  auth:
    jwt: {}
  external_url: "http://broker:8080"
trustee:
  url: "http://trustee:8000"
  username: "agency"
  password: "secret"
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        let node = &cfg.controller.docker.nodes[0];
        assert_eq!(node.node_name, "node-a");
        assert_eq!(node.hardware.ram_mb, 65536);
        assert_eq!(node.hardware.gpus[0].vram_mb, 24576);
    }
}
