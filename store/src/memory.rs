//! In-memory `Store`, grounded on `scheduler/tests/mock_store.rs::MockStore`
//! (an `Arc<Mutex<HashMap<..>>>` behind the same trait the real backend
//! implements) — generalized from one map to the full entity set so every
//! crate downstream of `store` can unit-test against it without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::FailureReason;
use common::model::{Batch, BatchState, BlockEntry, CallbackPhase, Experiment, Node, User};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::repository::{Store, TokenConsumeResult};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    block_entries: Vec<BlockEntry>,
    experiments: HashMap<Uuid, Experiment>,
    batches: HashMap<Uuid, Batch>,
    nodes: HashMap<String, Node>,
    tokens: HashMap<(Uuid, CallbackPhase), (String, bool)>,
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        self.inner.lock().await.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self.inner.lock().await.users.get(username).cloned())
    }

    async fn remove_user(&self, username: &str) -> Result<()> {
        self.inner.lock().await.users.remove(username);
        Ok(())
    }

    async fn set_password(&self, username: &str, verifier: &str, salt: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.users.get_mut(username) {
            Some(u) => {
                u.verifier = verifier.to_string();
                u.salt = salt.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_block_entry(&self, entry: &BlockEntry) -> Result<()> {
        self.inner.lock().await.block_entries.push(entry.clone());
        Ok(())
    }

    async fn count_block_entries(&self, ip: &str, username: &str, since: DateTime<Utc>) -> Result<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .block_entries
            .iter()
            .filter(|e| e.ip == ip && e.username == username && e.timestamp >= since)
            .count() as i64)
    }

    async fn purge_block_entries(&self, ip: &str, username: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.block_entries.retain(|e| !(e.ip == ip && e.username == username));
        Ok(())
    }

    async fn insert_experiment(&self, experiment: &Experiment) -> Result<()> {
        self.inner.lock().await.experiments.insert(experiment.id, experiment.clone());
        Ok(())
    }

    async fn get_experiment(&self, id: Uuid) -> Result<Option<Experiment>> {
        Ok(self.inner.lock().await.experiments.get(&id).cloned())
    }

    async fn list_experiments(
        &self,
        username: Option<&str>,
        limit: i64,
        skip: i64,
    ) -> Result<Vec<Experiment>> {
        let inner = self.inner.lock().await;
        let mut v: Vec<Experiment> = inner
            .experiments
            .values()
            .filter(|e| username.map(|u| u == e.username).unwrap_or(true))
            .cloned()
            .collect();
        v.sort_by_key(|e| e.registration_time);
        Ok(v.into_iter().skip(skip.max(0) as usize).take(limit.max(0) as usize).collect())
    }

    async fn insert_batches(&self, batches: &[Batch]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for b in batches {
            inner.batches.insert(b.id, b.clone());
        }
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>> {
        Ok(self.inner.lock().await.batches.get(&id).cloned())
    }

    async fn list_batches(
        &self,
        state: Option<BatchState>,
        experiment_id: Option<Uuid>,
        username: Option<&str>,
    ) -> Result<Vec<Batch>> {
        let inner = self.inner.lock().await;
        let mut v: Vec<Batch> = inner
            .batches
            .values()
            .filter(|b| state.map(|s| s == b.state).unwrap_or(true))
            .filter(|b| experiment_id.map(|e| e == b.experiment_id).unwrap_or(true))
            .filter(|b| username.map(|u| u == b.username).unwrap_or(true))
            .cloned()
            .collect();
        v.sort_by_key(|b| (b.registration_time, b.batch_index));
        Ok(v)
    }

    async fn list_pending_batches(&self) -> Result<Vec<Batch>> {
        self.list_batches(Some(BatchState::Registered), None, None).await
    }

    async fn list_active_batches(&self) -> Result<Vec<Batch>> {
        let inner = self.inner.lock().await;
        let mut v: Vec<Batch> = inner
            .batches
            .values()
            .filter(|b| matches!(b.state, BatchState::Scheduled | BatchState::Processing))
            .cloned()
            .collect();
        v.sort_by_key(|b| b.registration_time);
        Ok(v)
    }

    async fn count_inflight_for_experiment(&self, experiment_id: Uuid) -> Result<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .batches
            .values()
            .filter(|b| {
                b.experiment_id == experiment_id
                    && matches!(b.state, BatchState::Scheduled | BatchState::Processing)
            })
            .count() as i64)
    }

    async fn list_batches_needing_secret_delete(&self) -> Result<Vec<Batch>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .batches
            .values()
            .filter(|b| !b.protected_keys_voided && b.state.is_terminal())
            .cloned()
            .collect())
    }

    async fn list_batches_needing_notification(&self) -> Result<Vec<Batch>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .batches
            .values()
            .filter(|b| !b.notifications_sent && b.state.is_terminal())
            .cloned()
            .collect())
    }

    async fn list_terminal_with_node(&self) -> Result<Vec<Batch>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .batches
            .values()
            .filter(|b| b.state.is_terminal() && b.node.is_some())
            .cloned()
            .collect())
    }

    async fn cas_admit(&self, batch_id: Uuid, node: &str, gpu_ids: &[String], now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(b) = inner.batches.get_mut(&batch_id) else {
            return Ok(false);
        };
        if b.state != BatchState::Registered {
            return Ok(false);
        }
        b.node = Some(node.to_string());
        b.gpu_ids = gpu_ids.to_vec();
        b.push_history(BatchState::Scheduled, vec![], now);
        Ok(true)
    }

    async fn cas_start_processing(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(b) = inner.batches.get_mut(&batch_id) else {
            return Ok(false);
        };
        if b.state != BatchState::Scheduled {
            return Ok(false);
        }
        b.push_history(BatchState::Processing, vec![], now);
        Ok(true)
    }

    async fn cas_terminal(
        &self,
        batch_id: Uuid,
        expected: &[BatchState],
        new_state: BatchState,
        reason: Option<&FailureReason>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(b) = inner.batches.get_mut(&batch_id) else {
            return Ok(false);
        };
        if !expected.contains(&b.state) {
            return Ok(false);
        }
        let debug_info = reason.map(|r| vec![r.debug_string()]).unwrap_or_default();
        b.push_history(new_state, debug_info, now);
        Ok(true)
    }

    async fn cas_retry(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(b) = inner.batches.get_mut(&batch_id) else {
            return Ok(false);
        };
        if b.state != BatchState::Failed {
            return Ok(false);
        }
        b.node = None;
        b.gpu_ids.clear();
        b.attempts += 1;
        b.push_history(BatchState::Registered, vec!["retry".to_string()], now);
        Ok(true)
    }

    async fn cas_cancel(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(b) = inner.batches.get_mut(&batch_id) else {
            return Ok(false);
        };
        if b.state.is_terminal() {
            return Ok(false);
        }
        b.push_history(BatchState::Cancelled, vec![], now);
        Ok(true)
    }

    async fn clear_batch_node(&self, batch_id: Uuid) -> Result<()> {
        if let Some(b) = self.inner.lock().await.batches.get_mut(&batch_id) {
            b.node = None;
            b.gpu_ids.clear();
        }
        Ok(())
    }

    async fn set_protected_keys_voided(&self, batch_id: Uuid) -> Result<()> {
        if let Some(b) = self.inner.lock().await.batches.get_mut(&batch_id) {
            b.protected_keys_voided = true;
        }
        Ok(())
    }

    async fn set_notifications_sent(&self, batch_id: Uuid) -> Result<()> {
        if let Some(b) = self.inner.lock().await.batches.get_mut(&batch_id) {
            b.notifications_sent = true;
        }
        Ok(())
    }

    async fn record_callback_fields(
        &self,
        batch_id: Uuid,
        inputs: Option<serde_json::Value>,
        outputs: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(b) = inner.batches.get_mut(&batch_id) else {
            return Err(StoreError::NotFound);
        };
        if let Some(serde_json::Value::Object(map)) = inputs {
            b.inputs.extend(map.into_iter());
        }
        if let Some(serde_json::Value::Object(map)) = outputs {
            b.outputs.extend(map.into_iter());
        }
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.inner.lock().await.nodes.values().cloned().collect())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.inner.lock().await.nodes.get(name).cloned())
    }

    async fn upsert_node(&self, node: &Node) -> Result<()> {
        self.inner.lock().await.nodes.insert(node.node_name.clone(), node.clone());
        Ok(())
    }

    async fn commit_node_reservation(
        &self,
        node_name: &str,
        ram_delta_mb: i64,
        gpu_ids_add: &[String],
        gpu_ids_remove: &[String],
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(n) = inner.nodes.get_mut(node_name) else {
            return Err(StoreError::NotFound);
        };
        n.gpus_committed.retain(|g| !gpu_ids_remove.contains(g));
        for g in gpu_ids_add {
            if !n.gpus_committed.contains(g) {
                n.gpus_committed.push(g.clone());
            }
        }
        n.ram_committed_mb = (n.ram_committed_mb as i64 + ram_delta_mb).max(0) as u64;
        Ok(())
    }

    async fn issue_callback_token(&self, batch_id: Uuid, phase: CallbackPhase, token: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .tokens
            .insert((batch_id, phase), (token.to_string(), false));
        Ok(())
    }

    async fn consume_callback_token(
        &self,
        batch_id: Uuid,
        phase: CallbackPhase,
        token: &str,
    ) -> Result<TokenConsumeResult> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.tokens.get_mut(&(batch_id, phase)) else {
            return Ok(TokenConsumeResult::Invalid);
        };
        if entry.0 != token {
            return Ok(TokenConsumeResult::Invalid);
        }
        if entry.1 {
            return Ok(TokenConsumeResult::AlreadyUsed);
        }
        entry.1 = true;
        Ok(TokenConsumeResult::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cas_admit_rejects_non_registered() {
        let store = MemoryStore::new();
        let batch = Batch {
            id: Uuid::new_v4(),
            experiment_id: Uuid::new_v4(),
            username: "alice".to_string(),
            batch_index: 0,
            state: BatchState::Scheduled,
            node: Some("n1".to_string()),
            history: vec![],
            protected_keys_voided: false,
            notifications_sent: false,
            attempts: 0,
            registration_time: Utc::now(),
            inputs: Default::default(),
            outputs: Default::default(),
            secret_bundle_id: None,
            gpu_ids: vec![],
        };
        store.insert_batches(&[batch.clone()]).await.unwrap();
        assert!(!store.cas_admit(batch.id, "n2", &[], Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn callback_token_is_single_use() {
        let store = MemoryStore::new();
        let batch_id = Uuid::new_v4();
        store
            .issue_callback_token(batch_id, CallbackPhase::Main, "tok")
            .await
            .unwrap();
        assert_eq!(
            store
                .consume_callback_token(batch_id, CallbackPhase::Main, "tok")
                .await
                .unwrap(),
            TokenConsumeResult::Accepted
        );
        assert_eq!(
            store
                .consume_callback_token(batch_id, CallbackPhase::Main, "tok")
                .await
                .unwrap(),
            TokenConsumeResult::AlreadyUsed
        );
    }
}
