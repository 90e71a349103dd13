use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::FailureReason;
use common::model::{Batch, BatchState, BlockEntry, CallbackPhase, Experiment, Node, User};
use uuid::Uuid;

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenConsumeResult {
    Accepted,
    AlreadyUsed,
    Invalid,
}

/// Durable persistence for users, experiments, batches, nodes, blocklist
/// entries, and callback tokens (spec §4.3).
///
/// State-mutating batch methods are all compare-and-set on
/// `(batch.id, expected_state)`, so racing callers (a callback handler and
/// a schedule pass, or two racing callbacks) can never double-transition a
/// batch — the loser observes `Ok(false)` and must re-read and decide
/// whether to retry, matching
/// `backend/src/session/repository_sqlx.rs::reserve_execution`'s
/// `rows_affected() != 1` miss-is-not-an-error convention.
#[async_trait]
pub trait Store: Send + Sync {
    // ---- users ----
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, username: &str) -> Result<Option<User>>;
    async fn remove_user(&self, username: &str) -> Result<()>;
    /// Returns `false` if the user does not exist.
    async fn set_password(&self, username: &str, verifier: &str, salt: &str) -> Result<bool>;

    // ---- blocklist ----
    async fn record_block_entry(&self, entry: &BlockEntry) -> Result<()>;
    async fn count_block_entries(&self, ip: &str, username: &str, since: DateTime<Utc>) -> Result<i64>;
    async fn purge_block_entries(&self, ip: &str, username: &str) -> Result<()>;

    // ---- experiments ----
    async fn insert_experiment(&self, experiment: &Experiment) -> Result<()>;
    async fn get_experiment(&self, id: Uuid) -> Result<Option<Experiment>>;
    async fn list_experiments(
        &self,
        username: Option<&str>,
        limit: i64,
        skip: i64,
    ) -> Result<Vec<Experiment>>;

    // ---- batches: intake + reads ----
    async fn insert_batches(&self, batches: &[Batch]) -> Result<()>;
    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>>;
    async fn list_batches(
        &self,
        state: Option<BatchState>,
        experiment_id: Option<Uuid>,
        username: Option<&str>,
    ) -> Result<Vec<Batch>>;

    /// `state=registered`, ordered by `registration_time` then `batch_index`
    /// (spec §4.7 Phase A FIFO order).
    async fn list_pending_batches(&self) -> Result<Vec<Batch>>;
    /// `state in (scheduled, processing)`, used by Phase R's reap scan.
    async fn list_active_batches(&self) -> Result<Vec<Batch>>;
    /// In-flight siblings of one experiment, for the concurrency-limit check.
    async fn count_inflight_for_experiment(&self, experiment_id: Uuid) -> Result<i64>;
    async fn list_batches_needing_secret_delete(&self) -> Result<Vec<Batch>>;
    async fn list_batches_needing_notification(&self) -> Result<Vec<Batch>>;
    /// Batches in any terminal state but still carrying a node assignment —
    /// Phase C's release targets. Only the `cancelled` subset also gets a
    /// best-effort `NodeAgentClient.cancel` (spec §4.7); all of them get their
    /// node reservation released and `node` cleared.
    async fn list_terminal_with_node(&self) -> Result<Vec<Batch>>;

    // ---- batch state transitions (CAS) ----

    /// `registered -> scheduled`, recording `node` and `gpu_ids` and
    /// appending a history entry. Fails (returns `Ok(false)`) if the batch
    /// is no longer `registered`. Persisting `gpu_ids` here (not just
    /// holding it in the Controller's process memory) is what lets a
    /// restarted Controller still release exactly the physical GPUs a
    /// terminated batch held.
    async fn cas_admit(&self, batch_id: Uuid, node: &str, gpu_ids: &[String], now: DateTime<Utc>) -> Result<bool>;

    /// `scheduled -> processing`, on the `main`-phase-started callback.
    async fn cas_start_processing(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Transitions a batch from one of `expected` into a terminal state,
    /// appending a history entry carrying `reason`'s debug string.
    async fn cas_terminal(
        &self,
        batch_id: Uuid,
        expected: &[BatchState],
        new_state: BatchState,
        reason: Option<&FailureReason>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `failed -> registered`, clearing `node` and `gpu_ids`, incrementing
    /// `attempts` (spec §4.7 retry policy).
    async fn cas_retry(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Any non-terminal state `-> cancelled` (Broker's `DELETE /batches/{id}`).
    async fn cas_cancel(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Clears a terminal batch's `node` and `gpu_ids` fields once Phase C
    /// has attempted (or skipped, for an already-unreachable node) its
    /// best-effort cancel, so `list_terminal_with_node` does not keep
    /// re-offering it every pass.
    async fn clear_batch_node(&self, batch_id: Uuid) -> Result<()>;
    async fn set_protected_keys_voided(&self, batch_id: Uuid) -> Result<()>;
    async fn set_notifications_sent(&self, batch_id: Uuid) -> Result<()>;
    async fn record_callback_fields(
        &self,
        batch_id: Uuid,
        inputs: Option<serde_json::Value>,
        outputs: Option<serde_json::Value>,
    ) -> Result<()>;

    // ---- nodes ----
    async fn list_nodes(&self) -> Result<Vec<Node>>;
    async fn get_node(&self, name: &str) -> Result<Option<Node>>;
    async fn upsert_node(&self, node: &Node) -> Result<()>;
    /// Atomically commits (or releases, with negative deltas) RAM and GPU
    /// reservation on a node. Called in the same logical step as
    /// `cas_admit`/`cas_terminal` so invariants 1-2 (spec §3) never observe
    /// a partially-applied reservation.
    async fn commit_node_reservation(
        &self,
        node_name: &str,
        ram_delta_mb: i64,
        gpu_ids_add: &[String],
        gpu_ids_remove: &[String],
    ) -> Result<()>;

    // ---- callback tokens ----
    async fn issue_callback_token(&self, batch_id: Uuid, phase: CallbackPhase, token: &str) -> Result<()>;
    /// Consumes a token if present, unused, and matching; idempotent replay
    /// of the same phase returns `AlreadyUsed` rather than erroring (spec
    /// §4.2: duplicate callback is a no-op 200).
    async fn consume_callback_token(
        &self,
        batch_id: Uuid,
        phase: CallbackPhase,
        token: &str,
    ) -> Result<TokenConsumeResult>;
}
