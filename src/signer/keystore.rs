//! External keystore signing utility
//!
//! Invokes `<command> wallet sign <digest> --keystore <path> --password <pw> --no-hash`
//! and parses the 65-byte hex signature it prints.

use super::SigningBackend;
use crate::config::KeystoreConfig;
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use ethers::types::{Signature, H256};
use tokio::process::Command;
use tracing::debug;

/// Signs digests with an encrypted keystore through an external program
pub struct ExternalKeystoreBackend {
    /// Program followed by any leading arguments
    command: Vec<String>,
    keystore: KeystoreConfig,
}

impl ExternalKeystoreBackend {
    pub fn new(command: Vec<String>, keystore: KeystoreConfig) -> RelayerResult<Self> {
        if command.is_empty() {
            return Err(RelayerError::Config(
                "signer command must name a program".to_string(),
            ));
        }
        Ok(Self { command, keystore })
    }
}

#[async_trait]
impl SigningBackend for ExternalKeystoreBackend {
    async fn sign_digest(&self, digest: H256) -> RelayerResult<Signature> {
        let (program, leading) = self
            .command
            .split_first()
            .ok_or_else(|| RelayerError::Config("empty signer command".to_string()))?;

        let output = Command::new(program)
            .args(leading)
            .arg("wallet")
            .arg("sign")
            .arg(format!("{:?}", digest))
            .arg("--keystore")
            .arg(&self.keystore.keystore_path)
            .arg("--password")
            .arg(&self.keystore.password)
            .arg("--no-hash")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RelayerError::Signing(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(RelayerError::Signing(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("External signer returned {} bytes", stdout.len());
        parse_signature(&stdout)
    }
}

/// Parse a `0x`-prefixed 65-byte `r || s || v` signature
pub fn parse_signature(output: &str) -> RelayerResult<Signature> {
    let trimmed = output.trim();
    let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    let bytes = hex::decode(hex_str)
        .map_err(|e| RelayerError::Signing(format!("signature is not hex: {}", e)))?;
    if bytes.len() != 65 {
        return Err(RelayerError::Signing(format!(
            "signature must be 65 bytes, got {}",
            bytes.len()
        )));
    }

    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|e| RelayerError::Signing(format!("malformed signature: {}", e)))?;

    match signature.v {
        0 | 1 | 27 | 28 => Ok(signature),
        v => Err(RelayerError::Signing(format!("invalid recovery id {}", v))),
    }
}
