//! The schedule pass itself: Phase R (Reap) -> C (Cancel) -> A (Admit) ->
//! P (Progress) -> N (Notify), grounded directly on
//! `backend/src/scheduler/scheduler.rs::Scheduler::on_tick`'s phased
//! structure (one short async method per phase, a `#[instrument]` span
//! around the whole pass, CAS-then-continue-on-miss rather than erroring).

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use common::error::FailureReason;
use common::model::{Batch, BatchState, Experiment};
use nodeagent::NodeAgentClient;
use notifier::NotificationRequest;
use rand::RngCore;
use secretclient::SecretClient;
use store::Store;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::resources;
use crate::{Result, Scheduler};

impl Scheduler {
    /// Runs one full pass. Errors here mean the Store itself is unreachable;
    /// per-batch failures never propagate out, they are recorded on the
    /// batch and the pass continues (spec §7 propagation policy).
    #[instrument(skip(self))]
    pub async fn run_pass(&self) -> Result<()> {
        self.phase_reap().await?;
        self.phase_cancel().await?;
        self.phase_admit().await?;
        self.phase_progress().await?;
        self.phase_notify().await?;
        Ok(())
    }

    /// Startup recovery (spec §5): grants every currently-declared node one
    /// `nodeTimeoutSec` grace window before Phase R can reap batches
    /// assigned to it, then runs a normal pass (which probes nodes,
    /// re-issues secret deletes for unvoided terminal batches, and proceeds
    /// through admission/progress/notify as usual).
    pub async fn recover_on_startup(&self) -> Result<()> {
        let now = Utc::now();
        let nodes = self.store.list_nodes().await?;
        let mut last_alive = self.node_last_alive.lock();
        for node in nodes {
            last_alive.entry(node.node_name).or_insert(now);
        }
        drop(last_alive);
        self.run_pass().await
    }

    #[instrument(skip(self))]
    async fn phase_reap(&self) -> Result<()> {
        let active = self.store.list_active_batches().await?;
        let now = Utc::now();

        let mut nodes_seen: HashMap<String, bool> = HashMap::new();
        for batch in &active {
            let Some(node_name) = &batch.node else { continue };
            if nodes_seen.contains_key(node_name) {
                continue;
            }
            let alive = self.probe_node(node_name).await;
            nodes_seen.insert(node_name.clone(), alive);
        }

        for batch in active {
            let Some(node_name) = batch.node.clone() else { continue };
            let alive = nodes_seen.get(&node_name).copied().unwrap_or(false);
            let timed_out = !alive && self.node_timed_out(&node_name, now);
            if !timed_out {
                continue;
            }

            let Some(experiment) = self.store.get_experiment(batch.experiment_id).await? else {
                continue;
            };
            self.fail_batch(&batch, &experiment, FailureReason::NodeLost, now).await?;
        }

        let terminal_unvoided = self.store.list_batches_needing_secret_delete().await?;
        for batch in terminal_unvoided {
            let refs = super::launch::collect_secret_refs(&batch);
            if refs.is_empty() {
                self.store.set_protected_keys_voided(batch.id).await?;
                continue;
            }
            let timeout = Duration::from_secs(self.config.rpc_timeout_sec);
            match tokio::time::timeout(timeout, self.secrets.delete(&refs)).await {
                Ok(Ok(())) => {
                    self.store.set_protected_keys_voided(batch.id).await?;
                }
                Ok(Err(e)) => warn!(batch_id = %batch.id, error = %e, "secret delete failed, retrying next pass"),
                Err(_) => warn!(batch_id = %batch.id, "secret delete timed out, retrying next pass"),
            }
        }

        Ok(())
    }

    /// Releases the node reservation of every terminal batch still carrying a
    /// node assignment, however it reached a terminal state (the Broker's
    /// callback handler for `succeeded`/`failed`, or its `DELETE
    /// /batches/{id}` for `cancelled`). Only the `cancelled` subset also gets
    /// a best-effort `NodeAgentClient.cancel` — a `succeeded`/`failed`
    /// batch's container has already exited on its own.
    #[instrument(skip(self))]
    async fn phase_cancel(&self) -> Result<()> {
        for batch in self.store.list_terminal_with_node().await? {
            let Some(node_name) = &batch.node else { continue };
            if batch.state == BatchState::Cancelled {
                if let Some(node) = self.store.get_node(node_name).await? {
                    let timeout = Duration::from_secs(self.config.rpc_timeout_sec);
                    match tokio::time::timeout(timeout, self.agents.cancel(&node.url, &batch.id.to_string())).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(batch_id = %batch.id, error = %e, "best-effort cancel failed"),
                        Err(_) => warn!(batch_id = %batch.id, "best-effort cancel timed out"),
                    }
                }
            }
            self.release_assignment(node_name, batch.id).await?;
            self.store.clear_batch_node(batch.id).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn phase_admit(&self) -> Result<()> {
        let pending = self.store.list_pending_batches().await?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut by_user: HashMap<String, Vec<Batch>> = HashMap::new();
        for batch in pending {
            by_user.entry(batch.username.clone()).or_default().push(batch);
        }

        for (_, mut batches) in by_user {
            // FIFO by registration time, then index, within each experiment's queue.
            batches.sort_by_key(|b| (b.registration_time, b.batch_index));

            loop {
                let mut experiments: HashMap<Uuid, Experiment> = HashMap::new();
                let mut inflight: HashMap<Uuid, i64> = HashMap::new();
                let mut eligible_experiment_ids = Vec::new();

                for batch in &batches {
                    if experiments.contains_key(&batch.experiment_id) {
                        continue;
                    }
                    let Some(experiment) = self.store.get_experiment(batch.experiment_id).await? else {
                        continue;
                    };
                    let count = self.store.count_inflight_for_experiment(batch.experiment_id).await?;
                    if count >= experiment.execution.batch_concurrency_limit as i64 {
                        experiments.insert(batch.experiment_id, experiment);
                        inflight.insert(batch.experiment_id, count);
                        continue;
                    }
                    eligible_experiment_ids.push(batch.experiment_id);
                    inflight.insert(batch.experiment_id, count);
                    experiments.insert(batch.experiment_id, experiment);
                }

                let candidates: Vec<&Experiment> = eligible_experiment_ids
                    .iter()
                    .filter_map(|id| experiments.get(id))
                    .collect();
                if candidates.is_empty() {
                    break;
                }

                let picked_id = self.fairness.lock().pick_next(candidates, &inflight);
                let Some(picked_id) = picked_id else { break };

                let Some(pos) = batches.iter().position(|b| b.experiment_id == picked_id) else {
                    break;
                };
                let batch = batches.remove(pos);
                let experiment = experiments.get(&picked_id).unwrap().clone();

                self.try_admit(&batch, &experiment).await?;
            }
        }

        Ok(())
    }

    #[instrument(skip(self, batch, experiment))]
    async fn try_admit(&self, batch: &Batch, experiment: &Experiment) -> Result<()> {
        let nodes = self.store.list_nodes().await?;
        let Some(assignment) = resources::find_fit(&nodes, &experiment.container) else {
            // No feasible node this pass; stays `registered`, retried next pass.
            return Ok(());
        };

        let timeout = Duration::from_secs(self.config.rpc_timeout_sec);
        let refs = super::launch::collect_secret_refs(batch);
        if !refs.is_empty() {
            let fetched = tokio::time::timeout(timeout, self.secrets.get(&refs)).await;
            let failure = match fetched {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some((e.to_string(), e.disable_retry())),
                Err(_) => Some(("secret lookup timed out".to_string(), false)),
            };
            if let Some((message, disable_retry)) = failure {
                self.fail_batch(
                    batch,
                    experiment,
                    FailureReason::Secret { message, disable_retry },
                    Utc::now(),
                )
                .await?;
                return Ok(());
            }
        }

        let token = generate_callback_token();
        let spec = super::launch::build_spec(batch, experiment, &assignment, &self.callback_base_url, &token);

        let node_url = self.node_url(&assignment.node_name).await?;
        let launched = tokio::time::timeout(timeout, self.agents.launch(&node_url, &spec)).await;
        let outcome = match launched {
            Ok(result) => result?,
            Err(_) => nodeagent::LaunchOutcome::TransportFailure,
        };

        match outcome {
            nodeagent::LaunchOutcome::Accepted => {
                let now = Utc::now();
                let committed = self
                    .store
                    .cas_admit(batch.id, &assignment.node_name, &assignment.gpu_ids, now)
                    .await?;
                if committed {
                    self.store
                        .commit_node_reservation(
                            &assignment.node_name,
                            experiment.container.ram_mb as i64,
                            &assignment.gpu_ids,
                            &[],
                        )
                        .await?;
                    self.store.issue_callback_token(batch.id, common::model::CallbackPhase::Input, &token).await?;
                    self.store.issue_callback_token(batch.id, common::model::CallbackPhase::Main, &token).await?;
                    self.store.issue_callback_token(batch.id, common::model::CallbackPhase::Output, &token).await?;
                }
                // CAS miss: another pass/caller already moved this batch; nothing to release,
                // we never committed a reservation on this path.
            }
            nodeagent::LaunchOutcome::Rejected(reason) => {
                self.fail_batch(batch, experiment, FailureReason::LaunchRejected(reason), Utc::now())
                    .await?;
            }
            nodeagent::LaunchOutcome::TransportFailure => {
                if batch.attempts + 1 >= self.config.max_launch_attempts {
                    self.fail_batch(batch, experiment, FailureReason::LaunchAttemptsExhausted, Utc::now())
                        .await?;
                } else {
                    warn!(batch_id = %batch.id, "launch transport failure, retrying next pass");
                }
            }
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn phase_progress(&self) -> Result<()> {
        // Callback-driven transitions (scheduled->processing, ->terminal) are
        // applied synchronously by the Broker's callback handler via CAS, so
        // this phase only needs to apply the retry policy to batches the
        // Broker already marked `failed`.
        let failed = self.store.list_batches(Some(BatchState::Failed), None, None).await?;
        for batch in failed {
            let Some(experiment) = self.store.get_experiment(batch.experiment_id).await? else {
                continue;
            };
            let Some(reason_str) = batch.last_failure_reason() else { continue };
            let reason = common::model::parse_failure_reason(reason_str);
            self.retry_if_eligible(&batch, &experiment, &reason).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn phase_notify(&self) -> Result<()> {
        let pending = self.store.list_batches_needing_notification().await?;
        let mut by_experiment: HashMap<Uuid, Vec<Batch>> = HashMap::new();
        for batch in pending {
            by_experiment.entry(batch.experiment_id).or_default().push(batch);
        }

        for (experiment_id, batches) in by_experiment {
            let Some(experiment) = self.store.get_experiment(experiment_id).await? else { continue };
            if experiment.notifications.is_empty() {
                for batch in &batches {
                    self.store.set_notifications_sent(batch.id).await?;
                }
                continue;
            }
            self.notifier.enqueue(NotificationRequest {
                urls: experiment.notifications.clone(),
                batches: batches.iter().map(|b| (b.id, b.state)).collect(),
            });
        }
        Ok(())
    }

    async fn retry_if_eligible(&self, batch: &Batch, experiment: &Experiment, reason: &FailureReason) -> Result<()> {
        if !experiment.execution.retry_if_failed {
            return Ok(());
        }
        if batch.attempts >= self.config.retry_limit {
            return Ok(());
        }
        if !reason.is_retryable() {
            return Ok(());
        }
        self.store.cas_retry(batch.id, Utc::now()).await?;
        Ok(())
    }

    async fn fail_batch(
        &self,
        batch: &Batch,
        experiment: &Experiment,
        reason: FailureReason,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let committed = self
            .store
            .cas_terminal(
                batch.id,
                &[BatchState::Registered, BatchState::Scheduled, BatchState::Processing],
                BatchState::Failed,
                Some(&reason),
                now,
            )
            .await?;
        if !committed {
            return Ok(());
        }
        if let Some(node_name) = &batch.node {
            self.release_assignment(node_name, batch.id).await?;
        }
        self.retry_if_eligible(batch, experiment, &reason).await
    }

    async fn release_assignment(&self, node_name: &str, batch_id: Uuid) -> Result<()> {
        if let Some(node) = self.store.get_node(node_name).await? {
            if let Some(batch) = self.store.get_batch(batch_id).await? {
                if let Some(experiment) = self.store.get_experiment(batch.experiment_id).await? {
                    self.store
                        .commit_node_reservation(
                            &node.node_name,
                            -(experiment.container.ram_mb as i64),
                            &[],
                            &batch.gpu_ids,
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Probes a node's agent, recording liveness and reaping any batch the
    /// agent itself reports as unknown (spec §4.7 Phase R).
    async fn probe_node(&self, node_name: &str) -> bool {
        let Ok(Some(node)) = self.store.get_node(node_name).await else { return false };
        let timeout = Duration::from_secs(self.config.rpc_timeout_sec);
        let probed = tokio::time::timeout(timeout, self.agents.probe(&node.url)).await;
        match probed {
            Ok(Ok(probe)) if probe.alive => {
                self.node_last_alive.lock().insert(node_name.to_string(), Utc::now());
                let mut updated = node.clone();
                updated.liveness = common::model::NodeLiveness::Alive;
                let _ = self.store.upsert_node(&updated).await;
                true
            }
            _ => {
                let mut updated = node.clone();
                updated.liveness = common::model::NodeLiveness::Unreachable;
                let _ = self.store.upsert_node(&updated).await;
                false
            }
        }
    }

    fn node_timed_out(&self, node_name: &str, now: chrono::DateTime<Utc>) -> bool {
        match self.node_last_alive.lock().get(node_name) {
            Some(last) => (now - *last).num_seconds() >= self.config.node_timeout_sec,
            None => true,
        }
    }

    async fn node_url(&self, node_name: &str) -> Result<String> {
        match self.store.get_node(node_name).await? {
            Some(node) => Ok(node.url),
            None => Ok(String::new()),
        }
    }
}

fn generate_callback_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

