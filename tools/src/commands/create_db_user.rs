//! Analog of `create_db_user/main.py`: the original repeatedly retries a
//! Mongo `updateUser`/`createUser` pair against a database that might still
//! be starting up. `sqlx::Any` has no separate user/role concept, so the
//! bootstrap step here is connecting and running the schema migration,
//! retried the same way while the store comes up.

use std::time::Duration;

use common::config::AppConfig;
use store::Db;
use tracing::{info, warn};

const MAX_ATTEMPTS: u32 = 10;

pub async fn run(config_path: Option<String>) -> anyhow::Result<()> {
    let path = AppConfig::resolve_path(config_path);
    let config = AppConfig::load(&path)?;

    for attempt in 1..=MAX_ATTEMPTS {
        match Db::connect(&config.store.database_url).await {
            Ok(db) => {
                db.migrate().await?;
                info!(database_url = %config.store.database_url, "database ready");
                return Ok(());
            }
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!(attempt, error = %e, "database not ready yet, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!()
}
