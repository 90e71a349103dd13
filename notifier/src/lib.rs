//! Fire-and-track webhook delivery for terminal batches (spec §4.8),
//! grounded on `backend/src/execution/executor.rs`'s per-item worker shape
//! (one logical job, retried with a bounded attempt count, result folded
//! back through a store handle) and on
//! `original_source/tests/test_notification_hook.py`'s `{"batches": [...]}`
//! body shape.

mod backoff;
mod types;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use store::Store;
use tracing::{info, warn};

pub use types::NotificationRequest;
use types::NotificationBody;

/// Delivers webhook notifications in the background; `enqueue` returns as
/// soon as the job is scheduled, matching the Scheduler's Phase N
/// ("enqueue webhook attempts") — delivery never blocks a schedule pass.
pub struct WebhookNotifier {
    http: Client,
    store: Arc<dyn Store>,
}

impl WebhookNotifier {
    pub fn new(store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { http, store })
    }

    /// Spawns delivery to every declared URL; once every URL has reached a
    /// terminal outcome (success or attempts exhausted) the batches are
    /// marked `notificationsSent=true`.
    pub fn enqueue(&self, req: NotificationRequest) {
        let http = self.http.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let body = NotificationBody::from(&req);
            let batch_ids: Vec<_> = req.batches.iter().map(|(id, _)| *id).collect();

            let deliveries = req
                .urls
                .iter()
                .map(|url| deliver_with_retry(&http, url, &body));
            futures::future::join_all(deliveries).await;

            for id in batch_ids {
                if let Err(e) = store.set_notifications_sent(id).await {
                    warn!(batch_id = %id, error = %e, "failed to record notificationsSent");
                }
            }
        });
    }
}

async fn deliver_with_retry(http: &Client, url: &str, body: &NotificationBody) {
    for attempt in 0..backoff::MAX_ATTEMPTS {
        match http.post(url).json(body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(%url, attempt, "webhook delivered");
                return;
            }
            Ok(resp) => {
                warn!(%url, attempt, status = %resp.status(), "webhook rejected");
            }
            Err(e) => {
                warn!(%url, attempt, error = %e, "webhook delivery failed");
            }
        }

        if attempt + 1 < backoff::MAX_ATTEMPTS {
            tokio::time::sleep(backoff::delay_for(attempt)).await;
        }
    }
    warn!(%url, attempts = backoff::MAX_ATTEMPTS, "webhook attempts exhausted");
}
