//! Error types for the GMP relayer

use thiserror::Error;

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Coordination API error: {0}")]
    Transport(String),

    #[error("Coordination API returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Malformed task {task_id}: {message}")]
    TaskDecode { task_id: String, message: String },

    #[error("Event parsing error: {0}")]
    EventParsing(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Shutdown while waiting for {operation}")]
    Cancelled { operation: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RelayerError {
    /// Check if the next scheduled tick is expected to fix the error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayerError::Transport(_)
                | RelayerError::UnexpectedStatus { .. }
                | RelayerError::ChainConnection { .. }
                | RelayerError::GasEstimation(_)
                | RelayerError::Timeout { .. }
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RelayerError::Config(_) => "config",
            RelayerError::Transport(_) | RelayerError::UnexpectedStatus { .. } => "transport",
            RelayerError::ChainConnection { .. } => "chain",
            RelayerError::Signing(_) => "signing",
            RelayerError::UnknownTaskType(_) => "unknown_task_type",
            RelayerError::TaskDecode { .. } => "task_decode",
            RelayerError::EventParsing(_) => "event_parsing",
            RelayerError::Transaction(_) => "transaction",
            RelayerError::GasEstimation(_) => "gas",
            RelayerError::Timeout { .. } => "timeout",
            RelayerError::Cancelled { .. } => "cancelled",
            RelayerError::Checkpoint(_) | RelayerError::Database(_) => "checkpoint",
        }
    }
}

impl From<reqwest::Error> for RelayerError {
    fn from(e: reqwest::Error) -> Self {
        RelayerError::Transport(e.to_string())
    }
}

/// Result type for relayer operations
pub type RelayerResult<T> = Result<T, RelayerError>;
