//! Client for the protected-value store (spec §4.4), grounded on
//! `original_source/cc-agency/cc_agency/trustee/app.py`'s three-route shape
//! (`POST`/`GET`/`DELETE /secrets`) and on the narrow, `Send + Sync + 'static`
//! trait-per-external-service convention in
//! `backend/src/execution/executor.rs::SwapExecutor`.

mod error;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

pub use error::{Result, SecretError};

/// Abstraction over the trustee HTTP service. Hides transport, auth, and
/// response-envelope details from callers (the Scheduler's secret-write and
/// secret-delete steps, and the Broker's RED-expansion path).
#[async_trait]
pub trait SecretClient: Send + Sync + 'static {
    async fn put(&self, values: BTreeMap<String, Value>) -> Result<()>;
    async fn get(&self, keys: &[String]) -> Result<BTreeMap<String, Value>>;
    async fn delete(&self, keys: &[String]) -> Result<()>;
}

#[derive(Serialize)]
struct SecretsPayload<'a>(&'a BTreeMap<String, Value>);

#[derive(Serialize)]
struct KeysPayload<'a>(&'a [String]);

#[derive(Deserialize)]
struct TrusteeEnvelope {
    state: String,
    #[serde(default)]
    debug_info: Option<String>,
    #[serde(default)]
    secrets: Option<BTreeMap<String, Value>>,
}

pub struct HttpSecretClient {
    http: Client,
    url: String,
    username: String,
    password: String,
}

impl HttpSecretClient {
    pub fn new(url: String, username: String, password: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            url,
            username,
            password,
        })
    }

    fn secrets_url(&self) -> String {
        format!("{}/secrets", self.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SecretClient for HttpSecretClient {
    #[instrument(skip(self, values), fields(count = values.len()))]
    async fn put(&self, values: BTreeMap<String, Value>) -> Result<()> {
        let resp = self
            .http
            .post(self.secrets_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&SecretsPayload(&values))
            .send()
            .await?
            .error_for_status()?;

        let envelope: TrusteeEnvelope = resp.json().await?;
        if envelope.state != "success" {
            return Err(SecretError::KeysExist(values.into_keys().collect()));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(count = keys.len()))]
    async fn get(&self, keys: &[String]) -> Result<BTreeMap<String, Value>> {
        let resp = self
            .http
            .get(self.secrets_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&KeysPayload(keys))
            .send()
            .await?
            .error_for_status()?;

        let envelope: TrusteeEnvelope = resp.json().await?;
        if envelope.state != "success" {
            return Err(SecretError::KeysMissing(keys.to_vec()));
        }
        Ok(envelope.secrets.unwrap_or_default())
    }

    #[instrument(skip(self), fields(count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> Result<()> {
        self.http
            .delete(self.secrets_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&KeysPayload(keys))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_url_trims_trailing_slash() {
        let c = HttpSecretClient::new(
            "http://trustee:8000/".to_string(),
            "u".to_string(),
            "p".to_string(),
        )
        .unwrap();
        assert_eq!(c.secrets_url(), "http://trustee:8000/secrets");
    }
}
