//! Task model returned by the coordination service

use crate::error::{RelayerError, RelayerResult};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task type. Unrecognized types are kept verbatim so they can be logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskKind {
    GatewayTx,
    Execute,
    Other(String),
}

impl From<String> for TaskKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "GATEWAY_TX" => TaskKind::GatewayTx,
            "EXECUTE" => TaskKind::Execute,
            _ => TaskKind::Other(value),
        }
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.as_str().to_string()
    }
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::GatewayTx => "GATEWAY_TX",
            TaskKind::Execute => "EXECUTE",
            TaskKind::Other(other) => other,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message embedded in a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
    #[serde(rename = "messageID")]
    pub message_id: String,
    pub source_chain: String,
    #[serde(default)]
    pub source_address: String,
    pub destination_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBody {
    /// Base64 calldata for the target contract (GATEWAY_TX)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<TaskMessage>,
    /// Base64 payload for the destination contract (EXECUTE)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// A unit of work assigned by the coordination service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub task: TaskBody,
}

impl Task {
    pub fn message(&self) -> Option<&TaskMessage> {
        self.task.message.as_ref()
    }

    /// Decoded `executeData`
    pub fn execute_data(&self) -> RelayerResult<Vec<u8>> {
        let encoded = self
            .task
            .execute_data
            .as_deref()
            .ok_or_else(|| self.decode_error("missing executeData"))?;
        self.decode_base64("executeData", encoded)
    }

    /// Decoded `payload`
    pub fn payload(&self) -> RelayerResult<Vec<u8>> {
        let encoded = self
            .task
            .payload
            .as_deref()
            .ok_or_else(|| self.decode_error("missing payload"))?;
        self.decode_base64("payload", encoded)
    }

    fn decode_base64(&self, field: &str, encoded: &str) -> RelayerResult<Vec<u8>> {
        BASE64
            .decode(encoded.trim())
            .map_err(|e| self.decode_error(&format!("{} is not valid base64: {}", field, e)))
    }

    pub(crate) fn decode_error(&self, message: &str) -> RelayerError {
        RelayerError::TaskDecode {
            task_id: self.id.clone(),
            message: message.to_string(),
        }
    }
}

/// `GET /chains/{chain}/tasks` response body
#[derive(Debug, Default, Deserialize)]
pub struct TasksResponse {
    #[serde(default)]
    pub data: TasksData,
}

#[derive(Debug, Default, Deserialize)]
pub struct TasksData {
    #[serde(default)]
    pub tasks: Vec<Task>,
}
