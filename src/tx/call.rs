//! Unsigned contract calls derived from coordination tasks

use crate::coordination::{Task, TaskKind};
use crate::error::{RelayerError, RelayerResult};

use ethers::types::{Address, Bytes};

/// Destination and calldata of the transaction that fulfils a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
}

/// Build the call for a task.
///
/// - `GATEWAY_TX`: `executeData` sent to the target contract
/// - `EXECUTE`: the payload sent to the message's destination address
/// - anything else: `UnknownTaskType`
pub fn build_call(task: &Task, target_contract: Address) -> RelayerResult<ContractCall> {
    match &task.kind {
        TaskKind::GatewayTx => Ok(ContractCall {
            to: target_contract,
            data: task.execute_data()?.into(),
        }),
        TaskKind::Execute => {
            let message = task
                .message()
                .ok_or_else(|| task.decode_error("EXECUTE task without message"))?;
            let to = message.destination_address.parse::<Address>().map_err(|e| {
                task.decode_error(&format!(
                    "invalid destinationAddress {}: {}",
                    message.destination_address, e
                ))
            })?;
            Ok(ContractCall {
                to,
                data: task.payload()?.into(),
            })
        }
        TaskKind::Other(kind) => Err(RelayerError::UnknownTaskType(kind.clone())),
    }
}
