//! Chain module - JSON-RPC access and gateway event watching
//!
//! This module provides:
//! - A provider bound to one chain endpoint (blocks, logs, fees, broadcast)
//! - The `ContractCall` watcher used by the subscriber

pub mod provider;
pub mod watcher;

pub use provider::{ChainProvider, GasPrice};
pub use watcher::EventWatcher;
