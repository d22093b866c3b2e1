//! Transaction signing behind a capability boundary
//!
//! The relayer process never holds private key material. A `TransactionSigner`
//! turns an unsigned transaction into a signed, serialized one; the default
//! implementation computes the signing hash locally and hands only that digest
//! to a pluggable `SigningBackend` (external keystore utility, HSM, remote
//! signing service).

mod keystore;

pub use keystore::{parse_signature, ExternalKeystoreBackend};

use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, Signature, H256};
use tracing::debug;

/// Produces signed, serialized transactions ready for broadcast
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_transaction(&self, tx: &TypedTransaction) -> RelayerResult<Bytes>;
}

/// Signs a 32-byte digest as-is, without hashing it again
#[async_trait]
pub trait SigningBackend: Send + Sync {
    async fn sign_digest(&self, digest: H256) -> RelayerResult<Signature>;
}

/// `TransactionSigner` that delegates the key operation to a `SigningBackend`
pub struct DigestSigner<B> {
    backend: B,
}

impl<B: SigningBackend> DigestSigner<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: SigningBackend> TransactionSigner for DigestSigner<B> {
    async fn sign_transaction(&self, tx: &TypedTransaction) -> RelayerResult<Bytes> {
        let chain_id = tx
            .chain_id()
            .ok_or_else(|| RelayerError::Signing("transaction has no chain id".to_string()))?
            .as_u64();

        let digest = tx.sighash();
        debug!("Requesting signature for digest {:?}", digest);

        let signature = self.backend.sign_digest(digest).await?;
        let signature = with_replay_protection(signature, tx, chain_id)?;

        Ok(tx.rlp_signed(&signature))
    }
}

/// Encode `v` the way the transaction type expects it.
///
/// Typed transactions carry the y-parity; legacy transactions carry the
/// EIP-155 value `parity + 35 + 2 * chain_id`.
fn with_replay_protection(
    mut signature: Signature,
    tx: &TypedTransaction,
    chain_id: u64,
) -> RelayerResult<Signature> {
    let parity = match signature.v {
        0 | 1 => signature.v,
        27 | 28 => signature.v - 27,
        v => {
            return Err(RelayerError::Signing(format!(
                "unexpected recovery id {} in signature",
                v
            )))
        }
    };

    signature.v = match tx {
        TypedTransaction::Legacy(_) => parity + 35 + chain_id * 2,
        _ => parity,
    };
    Ok(signature)
}
