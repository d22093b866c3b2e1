//! PostgreSQL checkpoint backend

use super::CheckpointStore;
use crate::config::CheckpointConfig;
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

/// Keeps one checkpoint row per task queue
pub struct PgCheckpointStore {
    pool: PgPool,
    chain: String,
}

impl PgCheckpointStore {
    /// Connect using `checkpoint.database_url`
    pub async fn connect(config: &CheckpointConfig, chain: &str) -> RelayerResult<Self> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            RelayerError::Config("checkpoint.database_url is not set".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await?;

        info!("Connected checkpoint database for chain {}", chain);
        Ok(Self::with_pool(pool, chain))
    }

    pub fn with_pool(pool: PgPool, chain: &str) -> Self {
        Self {
            pool,
            chain: chain.to_string(),
        }
    }

    pub async fn run_migrations(&self) -> RelayerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relay_checkpoints (
                chain VARCHAR(64) PRIMARY KEY,
                task_id TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Checkpoint table ready");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn read(&self) -> RelayerResult<Option<String>> {
        let row = sqlx::query("SELECT task_id FROM relay_checkpoints WHERE chain = $1")
            .bind(&self.chain)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("task_id")))
    }

    async fn write(&self, task_id: &str) -> RelayerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO relay_checkpoints (chain, task_id, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (chain)
            DO UPDATE SET task_id = $2, updated_at = NOW()
            "#,
        )
        .bind(&self.chain)
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        debug!("Saved checkpoint for chain {}: task {}", self.chain, task_id);
        Ok(())
    }
}
