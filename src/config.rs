//! Configuration management for the GMP relayer
//!
//! Startup configuration comes from three places: CLI flags (chain selection,
//! target contract, cursor), required environment variables (certificates,
//! API URL, keystore, RPC URLs) and an optional TOML tuning file with
//! environment variable substitution. Everything is resolved into immutable
//! settings values before any component is constructed.

use crate::cli::{IncluderArgs, SubscriberArgs};
use crate::error::{RelayerError, RelayerResult};

use clap::ValueEnum;
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CRT_PATH: &str = "CRT_PATH";
pub const KEY_PATH: &str = "KEY_PATH";
pub const GMP_API_URL: &str = "GMP_API_URL";
pub const KEYSTORE_PATH: &str = "KEYSTORE_PATH";
pub const KS_PW: &str = "KS_PW";
pub const RELAYER: &str = "RELAYER";

/// Chains the relayer knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupportedChain {
    Sepolia,
    Ethereum,
    TelcoinNetwork,
}

impl SupportedChain {
    pub fn chain_id(&self) -> u64 {
        match self {
            SupportedChain::Sepolia => 11_155_111,
            SupportedChain::Ethereum => 1,
            SupportedChain::TelcoinNetwork => 2017,
        }
    }

    /// Lowercase chain name
    pub fn name(&self) -> &'static str {
        match self {
            SupportedChain::Sepolia => "sepolia",
            SupportedChain::Ethereum => "ethereum",
            SupportedChain::TelcoinNetwork => "telcoin-network",
        }
    }

    /// Name used in coordination API paths and in event `sourceChain` fields.
    ///
    /// The public Ethereum test network is namespaced under `ethereum-`.
    pub fn api_name(&self) -> String {
        match self {
            SupportedChain::Sepolia => format!("ethereum-{}", self.name()),
            _ => self.name().to_string(),
        }
    }

    /// Environment variable holding the RPC URL for this chain
    pub fn rpc_env_var(&self) -> &'static str {
        match self {
            SupportedChain::Sepolia => "SEPOLIA_RPC_URL",
            SupportedChain::Ethereum => "MAINNET_RPC_URL",
            SupportedChain::TelcoinNetwork => "TN_RPC_URL",
        }
    }
}

impl fmt::Display for SupportedChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A chain the relayer is attached to for the lifetime of the process
#[derive(Debug, Clone)]
pub struct ChainEndpoint {
    pub chain: SupportedChain,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Gateway (subscriber) or target contract (includer)
    pub contract_address: Address,
}

impl ChainEndpoint {
    pub fn new(chain: SupportedChain, rpc_url: String, contract_address: Address) -> Self {
        Self {
            chain,
            chain_id: chain.chain_id(),
            rpc_url,
            contract_address,
        }
    }

    pub fn api_name(&self) -> String {
        self.chain.api_name()
    }
}

/// Mutual TLS client configuration for the coordination API
#[derive(Debug, Clone)]
pub struct CoordinationConfig {
    pub base_url: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub timeout: Duration,
}

/// Location of the encrypted keystore and its decryption secret
#[derive(Clone)]
pub struct KeystoreConfig {
    pub keystore_path: PathBuf,
    pub password: String,
}

impl fmt::Debug for KeystoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoreConfig")
            .field("keystore_path", &self.keystore_path)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Optional TOML tuning file. Every field has a default so the file may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub relayer: RelayerConfig,
    pub signer: SignerConfig,
    pub checkpoint: CheckpointConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    pub http_timeout_ms: u64,
    pub receipt_poll_interval_ms: u64,
    /// Unset means wait for the receipt indefinitely
    pub receipt_timeout_secs: Option<u64>,
    pub max_block_range: u64,
    pub gas_limit_buffer_percent: u64,
    pub gas_price_buffer_percent: u64,
    pub max_gas_price_gwei: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            http_timeout_ms: 30_000,
            receipt_poll_interval_ms: 2_000,
            receipt_timeout_secs: None,
            max_block_range: 1_000,
            gas_limit_buffer_percent: 20,
            gas_price_buffer_percent: 10,
            max_gas_price_gwei: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Program and leading arguments of the external signing utility
    pub command: Vec<String>,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            command: vec!["cast".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    File,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    pub path: PathBuf,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::File,
            path: PathBuf::from("./latest-task.txt"),
            database_url: None,
            max_connections: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Tuning {
    /// Load the tuning file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> RelayerResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelayerError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&substitute_env_vars(&raw))
    }

    pub fn parse(raw: &str) -> RelayerResult<Self> {
        let tuning: Tuning = toml::from_str(raw)
            .map_err(|e| RelayerError::Config(format!("Failed to parse configuration: {}", e)))?;
        tuning.validate()?;
        Ok(tuning)
    }

    fn validate(&self) -> RelayerResult<()> {
        if self.signer.command.is_empty() {
            return Err(RelayerError::Config(
                "signer.command must name a program".to_string(),
            ));
        }
        if self.checkpoint.backend == CheckpointBackend::Postgres
            && self.checkpoint.database_url.is_none()
        {
            return Err(RelayerError::Config(
                "checkpoint.database_url is required for the postgres backend".to_string(),
            ));
        }
        if self.relayer.max_block_range == 0 {
            return Err(RelayerError::Config(
                "relayer.max_block_range must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fully resolved configuration of the includer process
#[derive(Debug, Clone)]
pub struct IncluderSettings {
    pub destination: ChainEndpoint,
    pub relayer_address: Address,
    /// Chain whose task queue is polled
    pub task_chain: String,
    pub latest_task: Option<String>,
    pub resume_from_checkpoint: bool,
    pub poll_interval: Duration,
    pub coordination: CoordinationConfig,
    pub keystore: KeystoreConfig,
    pub tuning: Tuning,
}

/// Fully resolved configuration of the subscriber process
#[derive(Debug, Clone)]
pub struct SubscriberSettings {
    pub source: ChainEndpoint,
    pub from_block: Option<u64>,
    pub poll_interval: Duration,
    pub coordination: CoordinationConfig,
    pub tuning: Tuning,
}

impl IncluderSettings {
    pub fn from_env(args: &IncluderArgs, tuning: Tuning) -> RelayerResult<Self> {
        Self::resolve(args, tuning, |name| env::var(name).ok())
    }

    pub fn resolve<F>(args: &IncluderArgs, tuning: Tuning, lookup: F) -> RelayerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let coordination = coordination_config(&lookup, &tuning)?;
        let keystore = KeystoreConfig {
            keystore_path: PathBuf::from(require(&lookup, KEYSTORE_PATH)?),
            password: require(&lookup, KS_PW)?,
        };
        let relayer_address = parse_address(RELAYER, &require(&lookup, RELAYER)?)?;

        let chain = args.destination_chain;
        let rpc_url = require(&lookup, chain.rpc_env_var())?;
        let target = parse_address("--target-contract", &args.target_contract)?;

        if args.poll_interval == 0 {
            return Err(RelayerError::Config(
                "--poll-interval must be positive".to_string(),
            ));
        }

        Ok(Self {
            destination: ChainEndpoint::new(chain, rpc_url, target),
            relayer_address,
            task_chain: args.task_chain.clone().unwrap_or_else(|| chain.api_name()),
            latest_task: args.latest_task.clone().filter(|t| !t.is_empty()),
            resume_from_checkpoint: args.resume_from_checkpoint,
            poll_interval: Duration::from_millis(args.poll_interval),
            coordination,
            keystore,
            tuning,
        })
    }
}

impl SubscriberSettings {
    pub fn from_env(args: &SubscriberArgs, tuning: Tuning) -> RelayerResult<Self> {
        Self::resolve(args, tuning, |name| env::var(name).ok())
    }

    pub fn resolve<F>(args: &SubscriberArgs, tuning: Tuning, lookup: F) -> RelayerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let coordination = coordination_config(&lookup, &tuning)?;
        let chain = args.target_chain;
        let rpc_url = require(&lookup, chain.rpc_env_var())?;
        let gateway = parse_address("--target-contract", &args.target_contract)?;

        if args.poll_interval == 0 {
            return Err(RelayerError::Config(
                "--poll-interval must be positive".to_string(),
            ));
        }

        Ok(Self {
            source: ChainEndpoint::new(chain, rpc_url, gateway),
            from_block: args.from_block,
            poll_interval: Duration::from_millis(args.poll_interval),
            coordination,
            tuning,
        })
    }
}

fn coordination_config<F>(lookup: &F, tuning: &Tuning) -> RelayerResult<CoordinationConfig>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(CoordinationConfig {
        base_url: require(lookup, GMP_API_URL)?
            .trim_end_matches('/')
            .to_string(),
        cert_path: PathBuf::from(require(lookup, CRT_PATH)?),
        key_path: PathBuf::from(require(lookup, KEY_PATH)?),
        timeout: Duration::from_millis(tuning.relayer.http_timeout_ms),
    })
}

fn require<F>(lookup: &F, name: &str) -> RelayerResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RelayerError::Config(format!("Environment variable {} is not set", name)))
}

fn parse_address(label: &str, value: &str) -> RelayerResult<Address> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| RelayerError::Config(format!("Invalid address for {}: {}", label, e)))
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
    }

    ENV_VAR
        .replace_all(input, |cap: &regex::Captures| {
            env::var(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}
