//! Checkpoint persistence
//!
//! The includer records the id of the last task it completed so an operator
//! can resume after a restart. Two backends are provided: a single-line file
//! (the default) and a PostgreSQL table keyed by chain.

mod file;
mod postgres;

pub use file::FileCheckpointStore;
pub use postgres::PgCheckpointStore;

use crate::config::{CheckpointBackend, CheckpointConfig};
use crate::error::RelayerResult;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Durable record of the last successfully processed task id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last written task id, `None` when nothing was ever written
    async fn read(&self) -> RelayerResult<Option<String>>;

    /// Replace the stored task id
    async fn write(&self, task_id: &str) -> RelayerResult<()>;
}

/// Open the configured backend. `chain` scopes the postgres row.
pub async fn open(config: &CheckpointConfig, chain: &str) -> RelayerResult<Arc<dyn CheckpointStore>> {
    match config.backend {
        CheckpointBackend::File => {
            let store = FileCheckpointStore::new(&config.path);
            info!("Checkpointing to file {:?}", store.path());
            Ok(Arc::new(store))
        }
        CheckpointBackend::Postgres => {
            let store = PgCheckpointStore::connect(config, chain).await?;
            store.run_migrations().await?;
            Ok(Arc::new(store))
        }
    }
}
