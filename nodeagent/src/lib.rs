//! Client for the per-node agent HTTP API (spec §4.5), grounded on the
//! narrow `SwapExecutor` trait in
//! `backend/src/execution/executor.rs` ("hides signing, RPC details,
//! error formats... errors must be normalized by the implementation") and
//! on `StonfiClient`'s connection-pooled `reqwest::Client` usage.

mod error;
mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{instrument, warn};

pub use error::{NodeAgentError, Result};
pub use types::{CallbackUrls, InputDescriptor, LaunchOutcome, LaunchSpec, OutputDescriptor, ProbeResult, Runtime};

/// Abstraction over a single node agent. The client only *initiates* work;
/// progress is reported back to the Broker via agent callbacks, never
/// polled through this trait (spec §4.5: "responsible only for
/// initiating the run").
#[async_trait]
pub trait NodeAgentClient: Send + Sync + 'static {
    async fn launch(&self, node_url: &str, spec: &LaunchSpec) -> Result<LaunchOutcome>;
    async fn probe(&self, node_url: &str) -> Result<ProbeResult>;
    /// Best-effort; callers (Phase C) do not treat failure as fatal.
    async fn cancel(&self, node_url: &str, batch_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct LaunchResponse {
    state: String,
    #[serde(default)]
    reason: Option<String>,
}

pub struct HttpNodeAgentClient {
    http: Client,
}

impl HttpNodeAgentClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self { http })
    }
}

impl Default for HttpNodeAgentClient {
    fn default() -> Self {
        Self::new().expect("reqwest client builds with static config")
    }
}

#[async_trait]
impl NodeAgentClient for HttpNodeAgentClient {
    #[instrument(skip(self, spec), fields(batch_id = %spec.batch_id, %node_url))]
    async fn launch(&self, node_url: &str, spec: &LaunchSpec) -> Result<LaunchOutcome> {
        let url = format!("{}/batches", node_url.trim_end_matches('/'));

        let resp = match self.http.post(&url).json(spec).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "node agent unreachable on launch");
                return Ok(LaunchOutcome::TransportFailure);
            }
        };

        if resp.status() == StatusCode::CONFLICT || resp.status().is_server_error() {
            return Ok(LaunchOutcome::TransportFailure);
        }

        let body: LaunchResponse = match resp.json().await {
            Ok(b) => b,
            Err(e) => return Err(NodeAgentError::InvalidResponse(e.to_string())),
        };

        Ok(match body.state.as_str() {
            "accepted" => LaunchOutcome::Accepted,
            "rejected" => LaunchOutcome::Rejected(body.reason.unwrap_or_default()),
            _ => LaunchOutcome::TransportFailure,
        })
    }

    #[instrument(skip(self), fields(%node_url))]
    async fn probe(&self, node_url: &str) -> Result<ProbeResult> {
        let url = format!("{}/probe", node_url.trim_end_matches('/'));

        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                resp.json().await.map_err(|e| NodeAgentError::InvalidResponse(e.to_string()))
            }
            _ => Ok(ProbeResult {
                alive: false,
                ..Default::default()
            }),
        }
    }

    #[instrument(skip(self), fields(%batch_id, %node_url))]
    async fn cancel(&self, node_url: &str, batch_id: &str) -> Result<()> {
        let url = format!("{}/batches/{}", node_url.trim_end_matches('/'), batch_id);
        if let Err(e) = self.http.delete(&url).send().await {
            warn!(error = %e, "best-effort cancel failed");
        }
        Ok(())
    }
}
