//! GMP relayer
//!
//! Two agents relay general message passing calls between chains and a
//! coordination service:
//! - the subscriber watches a gateway for `ContractCall` logs and reports them
//! - the includer polls for tasks, signs and lands them on the destination
//!   chain, reports completion and checkpoints progress

pub mod chain;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod events;
pub mod includer;
pub mod metrics;
pub mod signer;
pub mod state;
pub mod tx;

pub use error::{RelayerError, RelayerResult};
