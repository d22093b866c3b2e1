//! CLI command definitions and subcommands

use crate::config::SupportedChain;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// GMP relayer - observes contract calls and includes coordination tasks on chain
#[derive(Debug, Parser)]
#[command(name = "gmp-relayer", version, about)]
pub struct Cli {
    /// Optional TOML tuning file
    #[arg(short, long, global = true, env = "GMP_RELAYER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the coordination service for tasks and submit them on the destination chain
    Includer(IncluderArgs),

    /// Watch a gateway for ContractCall events and report them upstream
    Subscriber(SubscriberArgs),
}

#[derive(Debug, Clone, Args)]
pub struct IncluderArgs {
    /// Chain the tasks are executed on
    #[arg(long, value_enum)]
    pub destination_chain: SupportedChain,

    /// Gateway or executable contract that receives GATEWAY_TX calls
    #[arg(long)]
    pub target_contract: String,

    /// Only fetch tasks after this id
    #[arg(long)]
    pub latest_task: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 12_000)]
    pub poll_interval: u64,

    /// Chain name whose task queue is polled (defaults to the destination chain)
    #[arg(long)]
    pub task_chain: Option<String>,

    /// Start from the persisted checkpoint when --latest-task is not given
    #[arg(long)]
    pub resume_from_checkpoint: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SubscriberArgs {
    /// Chain whose gateway is watched
    #[arg(long, value_enum)]
    pub target_chain: SupportedChain,

    /// Gateway contract emitting ContractCall
    #[arg(long)]
    pub target_contract: String,

    /// First block to scan (defaults to the current head)
    #[arg(long)]
    pub from_block: Option<u64>,

    /// Log polling interval in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub poll_interval: u64,
}
