use std::sync::Arc;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

/// Thin connection-pool wrapper, mirroring `backend/src/db/mod.rs::Db`.
/// `sqlx::Any` lets the same code run against sqlite (tests, single-node
/// deployments) and postgres (the teacher's other supported backend)
/// without a second repository implementation.
#[derive(Clone)]
pub struct Db {
    pub pool: Arc<AnyPool>,
}

impl Db {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = AnyPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        crate::schema::migrate(&self.pool).await
    }
}
