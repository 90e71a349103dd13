use sqlx::AnyPool;

/// Creates every table and secondary index named in spec §4.3. Mirrors
/// `backend/src/db/schema.rs`'s idempotent `CREATE TABLE IF NOT EXISTS`
/// style; JSON-shaped sub-documents (history, hardware, notifications) are
/// stored as serialized text columns the way the teacher stores nothing
/// more complex than scalars — this is the one place we diverge, because
/// the spec's entities are nested where the teacher's session rows are
/// flat.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS users (
  username TEXT PRIMARY KEY,
  verifier TEXT NOT NULL,
  salt TEXT NOT NULL,
  is_admin BOOLEAN NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS block_entries (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ip TEXT NOT NULL,
  username TEXT NOT NULL,
  timestamp_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS experiments (
  id TEXT PRIMARY KEY,
  username TEXT NOT NULL,
  container_json TEXT NOT NULL,
  execution_json TEXT NOT NULL,
  notifications_json TEXT NOT NULL,
  registration_time_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS batches (
  id TEXT PRIMARY KEY,
  experiment_id TEXT NOT NULL,
  username TEXT NOT NULL,
  batch_index INTEGER NOT NULL,
  state TEXT NOT NULL,
  node TEXT,
  history_json TEXT NOT NULL,
  protected_keys_voided BOOLEAN NOT NULL,
  notifications_sent BOOLEAN NOT NULL,
  attempts INTEGER NOT NULL,
  registration_time_ms BIGINT NOT NULL,
  inputs_json TEXT NOT NULL,
  outputs_json TEXT NOT NULL,
  secret_bundle_id TEXT,
  gpu_ids_json TEXT NOT NULL DEFAULT '[]'
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS nodes (
  node_name TEXT PRIMARY KEY,
  url TEXT NOT NULL,
  hardware_json TEXT NOT NULL,
  liveness TEXT NOT NULL,
  ram_committed_mb BIGINT NOT NULL,
  gpus_committed_json TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS callback_tokens (
  batch_id TEXT NOT NULL,
  phase TEXT NOT NULL,
  token TEXT NOT NULL,
  used BOOLEAN NOT NULL,
  PRIMARY KEY (batch_id, phase)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_batches_state ON batches(state);")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_batches_experiment ON batches(experiment_id);")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_batches_username ON batches(username);")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_batches_notifications_sent ON batches(notifications_sent);",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_batches_protected_keys_voided ON batches(protected_keys_voided);",
    )
    .execute(pool)
    .await?;

    Ok(())
}
