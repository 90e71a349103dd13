//! Analog of `drop_db_collections/main.py`'s `mongo.db[collection].drop()`:
//! each named table is truncated, not the database dropped wholesale.

use common::config::AppConfig;
use store::Db;

use crate::cli::Collection;

pub async fn run(config_path: Option<String>, collections: Vec<Collection>) -> anyhow::Result<()> {
    let path = AppConfig::resolve_path(config_path);
    let config = AppConfig::load(&path)?;

    let db = Db::connect(&config.store.database_url).await?;
    db.migrate().await?;

    for collection in collections {
        let table = collection.table_name();
        sqlx::query(&format!("DELETE FROM {table}")).execute(&*db.pool).await?;
        println!("dropped {table}");
    }

    Ok(())
}
