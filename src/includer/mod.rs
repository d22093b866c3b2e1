//! Includer: pulls tasks from the coordination service and lands them on the
//! destination chain

pub mod poller;
pub mod processor;

pub use poller::{PollerState, TaskPoller};
pub use processor::{completion_event, TaskProcessor};

use crate::error::RelayerResult;
use crate::state::CheckpointStore;

use tracing::info;

/// Pick the cursor the first fetch starts after.
///
/// An explicit `--latest-task` wins; otherwise the checkpoint is consulted only
/// when `resume_from_checkpoint` is set.
pub async fn initial_cursor(
    latest_task: Option<String>,
    resume_from_checkpoint: bool,
    checkpoint: &dyn CheckpointStore,
) -> RelayerResult<Option<String>> {
    if let Some(task) = latest_task {
        info!("Starting after task {} from the command line", task);
        return Ok(Some(task));
    }

    if !resume_from_checkpoint {
        return Ok(None);
    }

    let stored = checkpoint.read().await?;
    match &stored {
        Some(task) => info!("Resuming after checkpointed task {}", task),
        None => info!("No checkpoint found, fetching from the start of the queue"),
    }
    Ok(stored)
}
