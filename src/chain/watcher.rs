//! Gateway event watcher
//!
//! Polls `eth_getLogs` for `ContractCall` logs emitted by the gateway, maps each
//! log to a `CALL` event and forwards every non-empty batch to the coordination
//! service in a single POST. A failed POST is logged and the batch dropped;
//! the coordination service deduplicates by event id.

use super::ChainProvider;
use crate::coordination::EventSink;
use crate::error::RelayerResult;
use crate::events::{ContractCallFilter, EventParser};

use ethers::contract::EthEvent;
use ethers::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Watches one gateway contract on one source chain
pub struct EventWatcher {
    /// Chain provider
    provider: Arc<ChainProvider>,
    /// Where observed events are reported
    sink: Arc<dyn EventSink>,
    /// Log to event mapping
    parser: EventParser,
    /// Delay between log polls
    poll_interval: Duration,
    /// Maximum number of blocks per `eth_getLogs` query
    max_block_range: u64,
    /// Next block to scan. Held for the whole poll so overlapping polls serialize.
    next_block: Mutex<Option<u64>>,
}

impl EventWatcher {
    /// Create a new watcher. Without `from_block` the scan starts at the head observed on startup.
    pub fn new(
        provider: Arc<ChainProvider>,
        sink: Arc<dyn EventSink>,
        from_block: Option<u64>,
        poll_interval: Duration,
        max_block_range: u64,
    ) -> Self {
        let parser = EventParser::new(provider.endpoint().api_name());
        Self {
            provider,
            sink,
            parser,
            poll_interval,
            max_block_range: max_block_range.max(1),
            next_block: Mutex::new(from_block),
        }
    }

    /// Chain name events are reported under
    pub fn source_chain(&self) -> &str {
        self.parser.source_chain()
    }

    /// Next block the watcher will scan, if a starting point is known yet
    pub async fn next_block(&self) -> Option<u64> {
        *self.next_block.lock().await
    }

    /// Main polling loop, runs until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RelayerResult<()> {
        info!(
            "Watching ContractCall on {:?} for chain {}",
            self.provider.contract_address(),
            self.source_chain()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.poll_once().await {
                warn!("Log poll failed on chain {}: {}", self.source_chain(), e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Event watcher for chain {} stopped", self.source_chain());
        Ok(())
    }

    /// Scan the next block range and forward what it contains.
    ///
    /// The cursor only advances when `eth_getLogs` succeeds.
    pub async fn poll_once(&self) -> RelayerResult<usize> {
        let mut next_block = self.next_block.lock().await;

        let current_block = self.provider.get_block_number().await?;
        let from_block = match *next_block {
            Some(block) => block,
            None => {
                info!(
                    "Current block (saved as starting point) on chain {}: {}",
                    self.source_chain(),
                    current_block
                );
                *next_block = Some(current_block);
                current_block
            }
        };

        if current_block < from_block {
            return Ok(0);
        }

        let to_block = std::cmp::min(current_block, from_block + self.max_block_range - 1);
        debug!(
            "Chain {}: scanning blocks {} to {}",
            self.source_chain(),
            from_block,
            to_block
        );

        let filter = Filter::new()
            .address(self.provider.contract_address())
            .topic0(ContractCallFilter::signature())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.provider.get_logs(&filter).await?;
        *next_block = Some(to_block + 1);
        crate::metrics::record_blocks_processed(self.source_chain(), to_block);

        Ok(self.handle_logs(logs).await)
    }

    /// Map a delivered batch of logs to events and post them as one batch.
    ///
    /// Returns the number of events accepted by the coordination service.
    pub async fn handle_logs(&self, logs: Vec<Log>) -> usize {
        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match self.parser.parse_log(log) {
                Ok(event) => {
                    info!("New event {} on chain {}", event.event_id(), self.source_chain());
                    crate::metrics::record_event(self.source_chain(), &event);
                    events.push(event);
                }
                Err(e) => error!("Failed to process log: {}", e),
            }
        }

        if events.is_empty() {
            return 0;
        }

        match self.sink.post_events(self.source_chain(), &events).await {
            Ok(()) => {
                crate::metrics::record_batch_posted(self.source_chain(), true);
                events.len()
            }
            Err(e) => {
                error!(
                    "Dropping batch of {} events for chain {}: {}",
                    events.len(),
                    self.source_chain(),
                    e
                );
                crate::metrics::record_batch_posted(self.source_chain(), false);
                0
            }
        }
    }
}
