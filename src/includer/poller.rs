//! Fixed-interval task polling
//!
//! IDLE -> FETCHING -> (empty: IDLE) | (tasks: DISPATCHING -> IDLE)
//!
//! A batch is processed inside the tick that fetched it and missed ticks are
//! skipped, so two batches never run at the same time.

use super::TaskProcessor;
use crate::coordination::TaskSource;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Fetching,
    Dispatching,
}

/// Pulls tasks for one chain and hands them to the processor
pub struct TaskPoller {
    source: Arc<dyn TaskSource>,
    processor: Arc<TaskProcessor>,
    /// Chain whose task queue is polled
    chain: String,
    poll_interval: Duration,
    /// Id of the last completed or skipped task, sent as `after`
    cursor: RwLock<Option<String>>,
    state: RwLock<PollerState>,
}

impl TaskPoller {
    pub fn new(
        source: Arc<dyn TaskSource>,
        processor: Arc<TaskProcessor>,
        chain: impl Into<String>,
        poll_interval: Duration,
        initial_cursor: Option<String>,
    ) -> Self {
        Self {
            source,
            processor,
            chain: chain.into(),
            poll_interval,
            cursor: RwLock::new(initial_cursor),
            state: RwLock::new(PollerState::Idle),
        }
    }

    pub async fn cursor(&self) -> Option<String> {
        self.cursor.read().await.clone()
    }

    pub async fn state(&self) -> PollerState {
        *self.state.read().await
    }

    /// Main polling loop, runs until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Polling tasks for chain {} every {:?} (cursor {:?}), reporting to {}",
            self.chain,
            self.poll_interval,
            self.cursor().await,
            self.processor.destination()
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }

            self.tick(&shutdown).await;
        }

        info!("Task poller for chain {} stopped", self.chain);
    }

    /// One fetch and dispatch cycle. Returns the number of tasks fetched.
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> usize {
        self.set_state(PollerState::Fetching).await;
        let after = self.cursor().await;

        let tasks = match self.source.fetch_tasks(&self.chain, after).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Failed to fetch tasks for chain {}: {}", self.chain, e);
                crate::metrics::record_fetch_failure(&self.chain);
                self.set_state(PollerState::Idle).await;
                return 0;
            }
        };

        if tasks.is_empty() {
            debug!("No pending tasks for chain {}", self.chain);
            self.set_state(PollerState::Idle).await;
            return 0;
        }

        info!("Fetched {} tasks for chain {}", tasks.len(), self.chain);
        crate::metrics::record_tasks_fetched(&self.chain, tasks.len());

        self.set_state(PollerState::Dispatching).await;
        if let Some(last) = self.processor.process_batch(&tasks, shutdown).await {
            *self.cursor.write().await = Some(last);
        }

        self.set_state(PollerState::Idle).await;
        tasks.len()
    }

    async fn set_state(&self, state: PollerState) {
        *self.state.write().await = state;
    }
}
