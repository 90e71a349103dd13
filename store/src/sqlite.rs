//! `sqlx::Any`-backed `Store` implementation, grounded on
//! `backend/src/session/repository_sqlx.rs::SqlxSessionRepository`: raw SQL
//! per operation, explicit row-to-struct mapping, and CAS updates expressed
//! as `UPDATE ... WHERE id = ? AND state = ?` whose `rows_affected()` tells
//! the caller whether it won the race.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::error::FailureReason;
use common::model::{
    Batch, BatchState, BlockEntry, CallbackPhase, Experiment, Hardware, HistoryEntry, Node,
    NodeLiveness, User,
};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::repository::{Store, TokenConsumeResult};

pub struct SqliteStore {
    pool: AnyPool,
}

impl SqliteStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

fn ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_ms(v: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(v).single().unwrap_or_else(Utc::now)
}

fn batch_state_row(row: &sqlx::any::AnyRow) -> Result<Batch> {
    let id: String = row.get("id");
    let experiment_id: String = row.get("experiment_id");
    let state: String = row.get("state");
    let history_json: String = row.get("history_json");
    let inputs_json: String = row.get("inputs_json");
    let outputs_json: String = row.get("outputs_json");
    let gpu_ids_json: String = row.get("gpu_ids_json");

    Ok(Batch {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Decode(e.to_string()))?,
        experiment_id: Uuid::parse_str(&experiment_id).map_err(|e| StoreError::Decode(e.to_string()))?,
        username: row.get("username"),
        batch_index: row.get::<i64, _>("batch_index") as u32,
        state: BatchState::parse(&state).ok_or_else(|| StoreError::Decode(format!("bad state {state}")))?,
        node: row.get::<Option<String>, _>("node"),
        history: serde_json::from_str::<Vec<HistoryEntry>>(&history_json)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        protected_keys_voided: row.get("protected_keys_voided"),
        notifications_sent: row.get("notifications_sent"),
        attempts: row.get::<i64, _>("attempts") as u32,
        registration_time: from_ms(row.get("registration_time_ms")),
        inputs: serde_json::from_str(&inputs_json).map_err(|e| StoreError::Decode(e.to_string()))?,
        outputs: serde_json::from_str(&outputs_json).map_err(|e| StoreError::Decode(e.to_string()))?,
        secret_bundle_id: row.get::<Option<String>, _>("secret_bundle_id"),
        gpu_ids: serde_json::from_str(&gpu_ids_json).map_err(|e| StoreError::Decode(e.to_string()))?,
    })
}

fn experiment_row(row: &sqlx::any::AnyRow) -> Result<Experiment> {
    let id: String = row.get("id");
    Ok(Experiment {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Decode(e.to_string()))?,
        username: row.get("username"),
        container: serde_json::from_str(&row.get::<String, _>("container_json"))
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        execution: serde_json::from_str(&row.get::<String, _>("execution_json"))
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        notifications: serde_json::from_str(&row.get::<String, _>("notifications_json"))
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        registration_time: from_ms(row.get("registration_time_ms")),
    })
}

fn node_row(row: &sqlx::any::AnyRow) -> Result<Node> {
    let hardware: Hardware = serde_json::from_str(&row.get::<String, _>("hardware_json"))
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    let gpus_committed: Vec<String> = serde_json::from_str(&row.get::<String, _>("gpus_committed_json"))
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    let liveness_s: String = row.get("liveness");

    Ok(Node {
        node_name: row.get("node_name"),
        url: row.get("url"),
        hardware,
        liveness: match liveness_s.as_str() {
            "alive" => NodeLiveness::Alive,
            "unreachable" => NodeLiveness::Unreachable,
            _ => NodeLiveness::Unknown,
        },
        ram_committed_mb: row.get::<i64, _>("ram_committed_mb") as u64,
        gpus_committed,
    })
}

fn liveness_str(l: NodeLiveness) -> &'static str {
    match l {
        NodeLiveness::Alive => "alive",
        NodeLiveness::Unreachable => "unreachable",
        NodeLiveness::Unknown => "unknown",
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users(username, verifier, salt, is_admin) VALUES (?, ?, ?, ?)")
            .bind(&user.username)
            .bind(&user.verifier)
            .bind(&user.salt)
            .bind(user.is_admin)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT username, verifier, salt, is_admin FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| User {
            username: r.get("username"),
            verifier: r.get("verifier"),
            salt: r.get("salt"),
            is_admin: r.get("is_admin"),
        }))
    }

    async fn remove_user(&self, username: &str) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_password(&self, username: &str, verifier: &str, salt: &str) -> Result<bool> {
        let res = sqlx::query("UPDATE users SET verifier = ?, salt = ? WHERE username = ?")
            .bind(verifier)
            .bind(salt)
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn record_block_entry(&self, entry: &BlockEntry) -> Result<()> {
        sqlx::query("INSERT INTO block_entries(ip, username, timestamp_ms) VALUES (?, ?, ?)")
            .bind(&entry.ip)
            .bind(&entry.username)
            .bind(ms(entry.timestamp))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_block_entries(&self, ip: &str, username: &str, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM block_entries WHERE ip = ? AND username = ? AND timestamp_ms >= ?",
        )
        .bind(ip)
        .bind(username)
        .bind(ms(since))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    async fn purge_block_entries(&self, ip: &str, username: &str) -> Result<()> {
        sqlx::query("DELETE FROM block_entries WHERE ip = ? AND username = ?")
            .bind(ip)
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_experiment(&self, experiment: &Experiment) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO experiments(id, username, container_json, execution_json, notifications_json, registration_time_ms)
VALUES (?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(experiment.id.to_string())
        .bind(&experiment.username)
        .bind(serde_json::to_string(&experiment.container).map_err(|e| StoreError::Decode(e.to_string()))?)
        .bind(serde_json::to_string(&experiment.execution).map_err(|e| StoreError::Decode(e.to_string()))?)
        .bind(serde_json::to_string(&experiment.notifications).map_err(|e| StoreError::Decode(e.to_string()))?)
        .bind(ms(experiment.registration_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_experiment(&self, id: Uuid) -> Result<Option<Experiment>> {
        let row = sqlx::query("SELECT * FROM experiments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(experiment_row).transpose()
    }

    async fn list_experiments(
        &self,
        username: Option<&str>,
        limit: i64,
        skip: i64,
    ) -> Result<Vec<Experiment>> {
        let rows = match username {
            Some(u) => {
                sqlx::query(
                    "SELECT * FROM experiments WHERE username = ? ORDER BY registration_time_ms LIMIT ? OFFSET ?",
                )
                .bind(u)
                .bind(limit)
                .bind(skip)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM experiments ORDER BY registration_time_ms LIMIT ? OFFSET ?")
                    .bind(limit)
                    .bind(skip)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(experiment_row).collect()
    }

    async fn insert_batches(&self, batches: &[Batch]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for b in batches {
            sqlx::query(
                r#"
INSERT INTO batches(
  id, experiment_id, username, batch_index, state, node, history_json,
  protected_keys_voided, notifications_sent, attempts, registration_time_ms,
  inputs_json, outputs_json, secret_bundle_id, gpu_ids_json
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
            )
            .bind(b.id.to_string())
            .bind(b.experiment_id.to_string())
            .bind(&b.username)
            .bind(b.batch_index as i64)
            .bind(b.state.as_str())
            .bind(&b.node)
            .bind(serde_json::to_string(&b.history).map_err(|e| StoreError::Decode(e.to_string()))?)
            .bind(b.protected_keys_voided)
            .bind(b.notifications_sent)
            .bind(b.attempts as i64)
            .bind(ms(b.registration_time))
            .bind(serde_json::to_string(&b.inputs).map_err(|e| StoreError::Decode(e.to_string()))?)
            .bind(serde_json::to_string(&b.outputs).map_err(|e| StoreError::Decode(e.to_string()))?)
            .bind(&b.secret_bundle_id)
            .bind(serde_json::to_string(&b.gpu_ids).map_err(|e| StoreError::Decode(e.to_string()))?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>> {
        let row = sqlx::query("SELECT * FROM batches WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(batch_state_row).transpose()
    }

    async fn list_batches(
        &self,
        state: Option<BatchState>,
        experiment_id: Option<Uuid>,
        username: Option<&str>,
    ) -> Result<Vec<Batch>> {
        let mut sql = "SELECT * FROM batches WHERE 1=1".to_string();
        if state.is_some() {
            sql.push_str(" AND state = ?");
        }
        if experiment_id.is_some() {
            sql.push_str(" AND experiment_id = ?");
        }
        if username.is_some() {
            sql.push_str(" AND username = ?");
        }
        sql.push_str(" ORDER BY registration_time_ms, batch_index");

        let mut q = sqlx::query(&sql);
        if let Some(s) = state {
            q = q.bind(s.as_str());
        }
        if let Some(e) = experiment_id {
            q = q.bind(e.to_string());
        }
        if let Some(u) = username {
            q = q.bind(u);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(batch_state_row).collect()
    }

    async fn list_pending_batches(&self) -> Result<Vec<Batch>> {
        let rows = sqlx::query(
            "SELECT * FROM batches WHERE state = 'registered' ORDER BY registration_time_ms, batch_index",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_state_row).collect()
    }

    async fn list_active_batches(&self) -> Result<Vec<Batch>> {
        let rows = sqlx::query(
            "SELECT * FROM batches WHERE state IN ('scheduled', 'processing') ORDER BY registration_time_ms",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_state_row).collect()
    }

    async fn count_inflight_for_experiment(&self, experiment_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM batches WHERE experiment_id = ? AND state IN ('scheduled', 'processing')",
        )
        .bind(experiment_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    async fn list_batches_needing_secret_delete(&self) -> Result<Vec<Batch>> {
        let rows = sqlx::query(
            "SELECT * FROM batches WHERE protected_keys_voided = 0 AND state IN ('succeeded', 'failed', 'cancelled')",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_state_row).collect()
    }

    async fn list_batches_needing_notification(&self) -> Result<Vec<Batch>> {
        let rows = sqlx::query(
            "SELECT * FROM batches WHERE notifications_sent = 0 AND state IN ('succeeded', 'failed', 'cancelled')",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_state_row).collect()
    }

    async fn list_terminal_with_node(&self) -> Result<Vec<Batch>> {
        let rows = sqlx::query(
            "SELECT * FROM batches WHERE state IN ('succeeded', 'failed', 'cancelled') AND node IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_state_row).collect()
    }

    async fn cas_admit(&self, batch_id: Uuid, node: &str, gpu_ids: &[String], now: DateTime<Utc>) -> Result<bool> {
        let history = append_history_sql(self, batch_id, BatchState::Scheduled, vec![], Some(node), now).await?;
        let gpu_ids_json = serde_json::to_string(gpu_ids).map_err(|e| StoreError::Decode(e.to_string()))?;
        let res = sqlx::query(
            "UPDATE batches SET state = 'scheduled', node = ?, gpu_ids_json = ?, history_json = ? WHERE id = ? AND state = 'registered'",
        )
        .bind(node)
        .bind(gpu_ids_json)
        .bind(history)
        .bind(batch_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn cas_start_processing(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let history = append_history_sql(self, batch_id, BatchState::Processing, vec![], None, now).await?;
        let res = sqlx::query(
            "UPDATE batches SET state = 'processing', history_json = ? WHERE id = ? AND state = 'scheduled'",
        )
        .bind(history)
        .bind(batch_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn cas_terminal(
        &self,
        batch_id: Uuid,
        expected: &[BatchState],
        new_state: BatchState,
        reason: Option<&FailureReason>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let debug_info = reason.map(|r| vec![r.debug_string()]).unwrap_or_default();
        let history = append_history_sql(self, batch_id, new_state, debug_info, None, now).await?;

        if expected.is_empty() {
            return Ok(false);
        }
        let placeholders = expected.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "UPDATE batches SET state = ?, history_json = ? WHERE id = ? AND state IN ({placeholders})"
        );
        let mut q = sqlx::query(&sql).bind(new_state.as_str()).bind(history).bind(batch_id.to_string());
        for s in expected {
            q = q.bind(s.as_str());
        }
        let res = q.execute(&self.pool).await?;
        Ok(res.rows_affected() == 1)
    }

    async fn cas_retry(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let history = append_history_sql(self, batch_id, BatchState::Registered, vec!["retry".to_string()], None, now).await?;
        let res = sqlx::query(
            r#"
UPDATE batches
SET state = 'registered', node = NULL, gpu_ids_json = '[]', attempts = attempts + 1, history_json = ?
WHERE id = ? AND state = 'failed';
"#,
        )
        .bind(history)
        .bind(batch_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn cas_cancel(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let history = append_history_sql(self, batch_id, BatchState::Cancelled, vec![], None, now).await?;
        let res = sqlx::query(
            r#"
UPDATE batches
SET state = 'cancelled', history_json = ?
WHERE id = ? AND state IN ('registered', 'scheduled', 'processing');
"#,
        )
        .bind(history)
        .bind(batch_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn clear_batch_node(&self, batch_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE batches SET node = NULL, gpu_ids_json = '[]' WHERE id = ?")
            .bind(batch_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_protected_keys_voided(&self, batch_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE batches SET protected_keys_voided = 1 WHERE id = ?")
            .bind(batch_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_notifications_sent(&self, batch_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE batches SET notifications_sent = 1 WHERE id = ?")
            .bind(batch_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_callback_fields(
        &self,
        batch_id: Uuid,
        inputs: Option<serde_json::Value>,
        outputs: Option<serde_json::Value>,
    ) -> Result<()> {
        if let Some(v) = inputs {
            sqlx::query("UPDATE batches SET inputs_json = ? WHERE id = ?")
                .bind(v.to_string())
                .bind(batch_id.to_string())
                .execute(&self.pool)
                .await?;
        }
        if let Some(v) = outputs {
            sqlx::query("UPDATE batches SET outputs_json = ? WHERE id = ?")
                .bind(v.to_string())
                .bind(batch_id.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let rows = sqlx::query("SELECT * FROM nodes").fetch_all(&self.pool).await?;
        rows.iter().map(node_row).collect()
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        let row = sqlx::query("SELECT * FROM nodes WHERE node_name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(node_row).transpose()
    }

    async fn upsert_node(&self, node: &Node) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO nodes(node_name, url, hardware_json, liveness, ram_committed_mb, gpus_committed_json)
VALUES (?, ?, ?, ?, ?, ?)
ON CONFLICT(node_name) DO UPDATE SET
  url = excluded.url,
  hardware_json = excluded.hardware_json,
  liveness = excluded.liveness,
  ram_committed_mb = excluded.ram_committed_mb,
  gpus_committed_json = excluded.gpus_committed_json;
"#,
        )
        .bind(&node.node_name)
        .bind(&node.url)
        .bind(serde_json::to_string(&node.hardware).map_err(|e| StoreError::Decode(e.to_string()))?)
        .bind(liveness_str(node.liveness))
        .bind(node.ram_committed_mb as i64)
        .bind(serde_json::to_string(&node.gpus_committed).map_err(|e| StoreError::Decode(e.to_string()))?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn commit_node_reservation(
        &self,
        node_name: &str,
        ram_delta_mb: i64,
        gpu_ids_add: &[String],
        gpu_ids_remove: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT ram_committed_mb, gpus_committed_json FROM nodes WHERE node_name = ? ")
            .bind(node_name)
            .fetch_one(&mut *tx)
            .await?;

        let ram: i64 = row.get("ram_committed_mb");
        let mut gpus: Vec<String> = serde_json::from_str(&row.get::<String, _>("gpus_committed_json"))
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        gpus.retain(|g| !gpu_ids_remove.contains(g));
        for g in gpu_ids_add {
            if !gpus.contains(g) {
                gpus.push(g.clone());
            }
        }

        let new_ram = (ram + ram_delta_mb).max(0);

        sqlx::query("UPDATE nodes SET ram_committed_mb = ?, gpus_committed_json = ? WHERE node_name = ?")
            .bind(new_ram)
            .bind(serde_json::to_string(&gpus).map_err(|e| StoreError::Decode(e.to_string()))?)
            .bind(node_name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn issue_callback_token(&self, batch_id: Uuid, phase: CallbackPhase, token: &str) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO callback_tokens(batch_id, phase, token, used) VALUES (?, ?, ?, 0)
ON CONFLICT(batch_id, phase) DO UPDATE SET token = excluded.token, used = 0;
"#,
        )
        .bind(batch_id.to_string())
        .bind(phase.as_str())
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_callback_token(
        &self,
        batch_id: Uuid,
        phase: CallbackPhase,
        token: &str,
    ) -> Result<TokenConsumeResult> {
        let row = sqlx::query("SELECT token, used FROM callback_tokens WHERE batch_id = ? AND phase = ?")
            .bind(batch_id.to_string())
            .bind(phase.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(TokenConsumeResult::Invalid);
        };

        let stored_token: String = row.get("token");
        if stored_token != token {
            return Ok(TokenConsumeResult::Invalid);
        }
        let used: bool = row.get("used");
        if used {
            return Ok(TokenConsumeResult::AlreadyUsed);
        }

        let res = sqlx::query(
            "UPDATE callback_tokens SET used = 1 WHERE batch_id = ? AND phase = ? AND used = 0",
        )
        .bind(batch_id.to_string())
        .bind(phase.as_str())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 1 {
            Ok(TokenConsumeResult::Accepted)
        } else {
            Ok(TokenConsumeResult::AlreadyUsed)
        }
    }
}

/// Reads the current history, appends one entry, and returns the serialized
/// column value, without writing it — callers fold this into the same
/// `UPDATE` statement that performs the CAS, keeping the history append and
/// the state transition atomic.
async fn append_history_sql(
    store: &SqliteStore,
    batch_id: Uuid,
    state: BatchState,
    debug_info: Vec<String>,
    node_override: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String> {
    let row = sqlx::query("SELECT history_json, node FROM batches WHERE id = ?")
        .bind(batch_id.to_string())
        .fetch_optional(&store.pool)
        .await?;
    let Some(row) = row else {
        return Err(StoreError::NotFound);
    };

    let mut history: Vec<HistoryEntry> = serde_json::from_str(&row.get::<String, _>("history_json"))
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    let existing_node: Option<String> = row.get("node");
    let node = node_override.map(|s| s.to_string()).or(existing_node);

    history.push(HistoryEntry {
        state,
        time: now,
        debug_info,
        node,
    });

    serde_json::to_string(&history).map_err(|e| StoreError::Decode(e.to_string()))
}
