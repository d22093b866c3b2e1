//! JSON-RPC access to a single chain

use crate::config::ChainEndpoint;
use crate::error::{RelayerError, RelayerResult};

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tracing::{debug, error};

/// Priority fee used when the chain reports a base fee
const DEFAULT_PRIORITY_FEE_WEI: u64 = 2_000_000_000;

/// HTTP provider bound to one chain endpoint
pub struct ChainProvider {
    /// Chain endpoint
    endpoint: ChainEndpoint,
    /// HTTP provider
    http: Provider<Http>,
}

impl ChainProvider {
    /// Create a new chain provider. No request is made until the first call.
    pub fn new(endpoint: ChainEndpoint) -> RelayerResult<Self> {
        let http = Provider::<Http>::try_from(endpoint.rpc_url.as_str())
            .map_err(|e| RelayerError::Config(format!("Invalid RPC URL: {}", e)))?
            .interval(Duration::from_millis(500));

        debug!(
            "HTTP provider for chain {} ({}) at {}",
            endpoint.chain, endpoint.chain_id, endpoint.rpc_url
        );

        Ok(Self {
            endpoint,
            http,
        })
    }

    fn rpc_error(&self, e: impl std::fmt::Display) -> RelayerError {
        RelayerError::ChainConnection {
            chain_id: self.endpoint.chain_id,
            message: e.to_string(),
        }
    }

    /// Get current block number
    pub async fn get_block_number(&self) -> RelayerResult<u64> {
        let block = self
            .http
            .get_block_number()
            .await
            .map_err(|e| self.rpc_error(e))?;
        Ok(block.as_u64())
    }

    /// Get logs for a filter
    pub async fn get_logs(&self, filter: &Filter) -> RelayerResult<Vec<Log>> {
        self.http.get_logs(filter).await.map_err(|e| self.rpc_error(e))
    }

    /// Get transaction receipt
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> RelayerResult<Option<TransactionReceipt>> {
        self.http
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| self.rpc_error(e))
    }

    /// Pending transaction count of an account
    pub async fn get_nonce(&self, account: Address) -> RelayerResult<U256> {
        self.http
            .get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| self.rpc_error(e))
    }

    /// Estimate gas for a transaction
    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> RelayerResult<U256> {
        self.http
            .estimate_gas(tx, None)
            .await
            .map_err(|e| RelayerError::GasEstimation(e.to_string()))
    }

    /// Broadcast a signed, serialized transaction
    pub async fn send_raw_transaction(&self, raw: Bytes) -> RelayerResult<H256> {
        let pending = self
            .http
            .send_raw_transaction(raw)
            .await
            .map_err(|e| RelayerError::Transaction(e.to_string()))?;
        Ok(pending.tx_hash())
    }

    /// Current fee quote: EIP-1559 when the chain reports a base fee, legacy otherwise.
    ///
    /// The quote is uncapped; `GasEstimator` applies margins and the ceiling.
    pub async fn get_gas_price(&self) -> RelayerResult<GasPrice> {
        let block = self
            .http
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| RelayerError::GasEstimation(e.to_string()))?
            .ok_or_else(|| RelayerError::GasEstimation("No latest block".to_string()))?;

        match block.base_fee_per_gas {
            Some(base_fee) => {
                let priority_fee = U256::from(DEFAULT_PRIORITY_FEE_WEI);
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas: eip1559_max_fee(base_fee, priority_fee),
                    max_priority_fee_per_gas: priority_fee,
                })
            }
            None => {
                let price = self
                    .http
                    .get_gas_price()
                    .await
                    .map_err(|e| RelayerError::GasEstimation(e.to_string()))?;
                Ok(GasPrice::Legacy(price))
            }
        }
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    "Health check failed for chain {}: {}",
                    self.endpoint.chain_id, e
                );
                false
            }
        }
    }

    pub fn endpoint(&self) -> &ChainEndpoint {
        &self.endpoint
    }

    /// Get chain ID
    pub fn chain_id(&self) -> u64 {
        self.endpoint.chain_id
    }

    /// Gateway or target contract of this endpoint
    pub fn contract_address(&self) -> Address {
        self.endpoint.contract_address
    }
}

/// Max fee = 2 * base_fee + priority_fee
fn eip1559_max_fee(base_fee: U256, priority_fee: U256) -> U256 {
    base_fee * 2 + priority_fee
}

/// Gas price types
#[derive(Debug, Clone, PartialEq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupportedChain;

    #[test]
    fn test_max_fee_formula() {
        let gwei = U256::from(1_000_000_000u64);
        let fee = eip1559_max_fee(gwei * 10, gwei * 2);
        assert_eq!(fee, gwei * 22);
    }

    #[test]
    fn test_invalid_rpc_url() {
        let endpoint = ChainEndpoint::new(
            SupportedChain::TelcoinNetwork,
            "not a url".to_string(),
            Address::zero(),
        );
        assert!(matches!(
            ChainProvider::new(endpoint),
            Err(RelayerError::Config(_))
        ));
    }
}
