use chrono::{DateTime, Duration, Utc};
use common::model::BlockEntry;
use store::Store;

/// Throttles repeated failed auth attempts per `(ip, username)` (spec §4.1,
/// resolved per Open Question: threshold 3 within a 60s window).
pub struct BlocklistPolicy {
    pub threshold: i64,
    pub window: Duration,
}

impl Default for BlocklistPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            window: Duration::seconds(60),
        }
    }
}

impl BlocklistPolicy {
    pub async fn is_blocked(
        &self,
        store: &dyn Store,
        ip: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> store::Result<bool> {
        let since = now - self.window;
        let count = store.count_block_entries(ip, username, since).await?;
        Ok(count >= self.threshold)
    }

    pub async fn record_failure(
        &self,
        store: &dyn Store,
        ip: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> store::Result<()> {
        store
            .record_block_entry(&BlockEntry {
                ip: ip.to_string(),
                username: username.to_string(),
                timestamp: now,
            })
            .await
    }

    pub async fn clear(&self, store: &dyn Store, ip: &str, username: &str) -> store::Result<()> {
        store.purge_block_entries(ip, username).await
    }
}
