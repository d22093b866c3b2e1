//! Coordination service boundary
//!
//! The relayer talks to the coordination service in two directions:
//! 1. It pulls pending tasks for the chain it includes transactions on
//! 2. It pushes observed `CALL` events and task completion events

pub mod client;
pub mod task;

pub use client::CoordinationClient;
pub use task::{Task, TaskBody, TaskKind, TaskMessage};

use crate::error::RelayerResult;
use crate::events::Event;

use async_trait::async_trait;

/// Source of pending tasks, ordered oldest to newest
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_tasks(&self, chain: &str, after: Option<String>) -> RelayerResult<Vec<Task>>;
}

/// Destination of observed events. A batch is accepted or rejected as a whole.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn post_events(&self, chain: &str, events: &[Event]) -> RelayerResult<()>;
}
