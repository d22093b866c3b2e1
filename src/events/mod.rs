//! Event types reported to the coordination service and parsing of gateway logs
//!
//! Two kinds of events flow upstream:
//! - `CALL` events, one per `ContractCall` log observed on a source chain
//! - completion events, one per task the includer landed on a destination chain

use crate::error::{RelayerError, RelayerResult};

use ethers::abi::RawLog;
use ethers::contract::{EthEvent, EthLogDecode};
use ethers::prelude::*;
use serde::{Deserialize, Serialize};

/// `ContractCall` as emitted by the gateway contract
#[derive(Debug, Clone, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "ContractCall",
    abi = "ContractCall(address,string,string,bytes32,bytes)"
)]
pub struct ContractCallFilter {
    #[ethevent(indexed)]
    pub sender: Address,
    pub destination_chain: String,
    pub destination_contract_address: String,
    #[ethevent(indexed)]
    pub payload_hash: [u8; 32],
    pub payload: Bytes,
}

/// One logical cross-chain call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "messageID")]
    pub message_id: String,
    pub source_chain: String,
    pub source_address: String,
    pub destination_address: String,
    pub payload_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    #[serde(rename = "eventID")]
    pub event_id: String,
    pub message: Message,
    pub destination_chain: String,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Successful,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMeta {
    #[serde(rename = "fromAddress")]
    pub from_address: String,
    #[serde(rename = "txID")]
    pub tx_id: String,
    pub finalized: bool,
}

/// Reports that a task has been included on the destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    #[serde(rename = "eventID")]
    pub event_id: String,
    #[serde(rename = "messageID", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub meta: CompletionMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_chain: Option<String>,
    pub status: ExecutionStatus,
}

/// Event posted to `/chains/{chain}/events`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "CALL")]
    Call(CallEvent),
    #[serde(rename = "GATEWAY_TX")]
    GatewayTxCompleted(CompletionEvent),
    #[serde(rename = "EXECUTE")]
    ExecuteCompleted(CompletionEvent),
}

impl Event {
    pub fn event_id(&self) -> &str {
        match self {
            Event::Call(e) => &e.event_id,
            Event::GatewayTxCompleted(e) | Event::ExecuteCompleted(e) => &e.event_id,
        }
    }

    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            Event::Call(_) => "call",
            Event::GatewayTxCompleted(_) => "gateway_tx",
            Event::ExecuteCompleted(_) => "execute",
        }
    }
}

/// Request body of the events endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishEventsRequest {
    pub events: Vec<Event>,
}

/// Event id derived from the log position: `{transactionHash}-{logIndex}`
pub fn event_id(tx_hash: &str, log_index: u64) -> String {
    format!("{}-{}", tx_hash, log_index)
}

/// Parses gateway logs into `CALL` events for one source chain
pub struct EventParser {
    source_chain: String,
}

impl EventParser {
    /// `source_chain` is the API name of the chain the logs come from
    pub fn new(source_chain: impl Into<String>) -> Self {
        Self {
            source_chain: source_chain.into(),
        }
    }

    pub fn source_chain(&self) -> &str {
        &self.source_chain
    }

    /// Parse a log entry into a `CALL` event
    pub fn parse_log(&self, log: &Log) -> RelayerResult<Event> {
        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| RelayerError::EventParsing("log has no transaction hash".into()))?;
        let log_index = log
            .log_index
            .ok_or_else(|| RelayerError::EventParsing("log has no log index".into()))?;

        let call = <ContractCallFilter as EthLogDecode>::decode_log(&RawLog::from(log.clone()))
            .map_err(|e| RelayerError::EventParsing(format!("not a ContractCall log: {}", e)))?;

        let id = event_id(&format!("{:?}", tx_hash), log_index.as_u64());

        Ok(Event::Call(CallEvent {
            event_id: id.clone(),
            message: Message {
                message_id: id,
                source_chain: self.source_chain.clone(),
                source_address: ethers::utils::to_checksum(&call.sender, None),
                destination_address: call.destination_contract_address,
                payload_hash: format!("0x{}", hex::encode(call.payload_hash)),
            },
            destination_chain: call.destination_chain,
            payload: format!("0x{}", hex::encode(&call.payload)),
        }))
    }
}
