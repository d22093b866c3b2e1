//! Transaction building and submission on the destination chain

mod call;
mod gas;
mod sender;

pub use call::{build_call, ContractCall};
pub use gas::GasEstimator;
pub use sender::{build_transaction, TransactionSender};

use crate::error::RelayerResult;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, TransactionReceipt, H256};

/// The chain tasks are landed on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DestinationChain: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Resolve nonce, gas limit and fees for a call
    async fn prepare_transaction(&self, call: &ContractCall) -> RelayerResult<TypedTransaction>;

    /// Broadcast a signed, serialized transaction
    async fn send_raw_transaction(&self, raw: Bytes) -> RelayerResult<H256>;

    /// Poll until a receipt for `tx_hash` is observed
    async fn wait_for_receipt(&self, tx_hash: H256) -> RelayerResult<TransactionReceipt>;
}
