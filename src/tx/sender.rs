//! Transaction preparation, broadcast and receipt tracking on the destination chain

use super::call::ContractCall;
use super::gas::GasEstimator;
use super::DestinationChain;
use crate::chain::{ChainProvider, GasPrice};
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Prepares and lands transactions for the relayer account
pub struct TransactionSender {
    /// Destination chain provider
    provider: Arc<ChainProvider>,
    /// Relayer account; nonces and gas estimates are resolved for it
    relayer: Address,
    /// Gas estimator
    gas_estimator: GasEstimator,
    /// Delay between receipt polls
    receipt_poll_interval: Duration,
    /// Give up waiting for a receipt after this long; `None` waits forever
    receipt_timeout: Option<Duration>,
    /// Abandons a pending receipt wait when it flips to true
    shutdown: watch::Receiver<bool>,
}

impl TransactionSender {
    /// Create a new transaction sender
    pub fn new(
        provider: Arc<ChainProvider>,
        relayer: Address,
        gas_estimator: GasEstimator,
        receipt_poll_interval: Duration,
        receipt_timeout: Option<Duration>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        info!("Transaction sender initialized for relayer {:?}", relayer);
        Self {
            provider,
            relayer,
            gas_estimator,
            receipt_poll_interval,
            receipt_timeout,
            shutdown,
        }
    }
}

/// Assemble a typed transaction for the given call and resolved parameters
pub fn build_transaction(
    chain_id: u64,
    from: Address,
    call: &ContractCall,
    nonce: U256,
    gas_limit: Option<U256>,
    gas_price: &GasPrice,
) -> TypedTransaction {
    let mut tx: TypedTransaction = match gas_price {
        GasPrice::Legacy(price) => TransactionRequest::new()
            .from(from)
            .to(call.to)
            .data(call.data.clone())
            .nonce(nonce)
            .gas_price(*price)
            .chain_id(chain_id)
            .into(),
        GasPrice::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => Eip1559TransactionRequest::new()
            .from(from)
            .to(call.to)
            .data(call.data.clone())
            .nonce(nonce)
            .max_fee_per_gas(*max_fee_per_gas)
            .max_priority_fee_per_gas(*max_priority_fee_per_gas)
            .chain_id(chain_id)
            .into(),
    };

    if let Some(gas) = gas_limit {
        tx.set_gas(gas);
    }
    tx
}

#[async_trait]
impl DestinationChain for TransactionSender {
    fn chain_id(&self) -> u64 {
        self.provider.chain_id()
    }

    async fn prepare_transaction(&self, call: &ContractCall) -> RelayerResult<TypedTransaction> {
        let chain_id = self.provider.chain_id();

        let nonce = self.provider.get_nonce(self.relayer).await?;
        let gas_price = self
            .gas_estimator
            .gas_price(self.provider.get_gas_price().await?);

        let draft = build_transaction(chain_id, self.relayer, call, nonce, None, &gas_price);
        let gas_limit = self
            .gas_estimator
            .gas_limit(self.provider.estimate_gas(&draft).await?);

        let tx = build_transaction(
            chain_id,
            self.relayer,
            call,
            nonce,
            Some(gas_limit),
            &gas_price,
        );
        debug!(
            "Prepared tx to {:?} on chain {}: nonce {}, gas {}, fees {:?}",
            call.to, chain_id, nonce, gas_limit, gas_price
        );
        Ok(tx)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> RelayerResult<H256> {
        let tx_hash = self.provider.send_raw_transaction(raw).await?;
        info!(
            "Transaction sent on chain {}: {:?}",
            self.provider.chain_id(),
            tx_hash
        );
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> RelayerResult<TransactionReceipt> {
        let started = Instant::now();
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                warn!("Shutdown requested, no longer waiting for {:?}", tx_hash);
                return Err(RelayerError::Cancelled {
                    operation: format!("receipt of {:?}", tx_hash),
                });
            }

            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => debug!("No receipt yet for {:?}", tx_hash),
                Err(e) => warn!("Failed to fetch receipt for {:?}: {}", tx_hash, e),
            }

            if let Some(limit) = self.receipt_timeout {
                if started.elapsed() >= limit {
                    return Err(RelayerError::Timeout {
                        operation: format!("receipt of {:?}", tx_hash),
                    });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.receipt_poll_interval) => {}
                changed = shutdown.changed() => {
                    // Sender gone: nobody can request shutdown any more
                    if changed.is_err() {
                        tokio::time::sleep(self.receipt_poll_interval).await;
                    }
                }
            }
        }
    }
}
