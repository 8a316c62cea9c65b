//! Configuration module

use crate::engine::EngineKind;
use crate::error::ConfigError;
use crate::types::GWEI;
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Mainnet check-and-send deployment
pub const DEFAULT_CHECK_AND_SEND: &str = "0xC4595E3966e0Ce6E3c46854647611940A09448d3";

/// 1/400 ether
pub const DEFAULT_MINER_REWARD_WEI: &str = "2500000000000000";

pub const DEFAULT_BLOCKS_IN_FUTURE: u64 = 2;

pub const DEFAULT_CONFIG_PATH: &str = "config/rescue.json";

/// Main configuration struct, as read from file or environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub relay: RelayConfig,
    pub accounts: AccountsConfig,
    pub bundle: BundleConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    pub chain_id: Option<u64>,
    pub head_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub url: String,
    /// Relay identity key; a throwaway identity is generated when absent
    pub signing_key: Option<String>,
    pub resolution_timeout_secs: u64,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    pub zero_gas_key: String,
    pub donor_key: String,
}

impl std::fmt::Debug for AccountsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountsConfig")
            .field("zero_gas_key", &"<redacted>")
            .field("donor_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    pub recipient: String,
    pub miner_reward_wei: String,
    pub gas_price_floor_gwei: u64,
    pub blocks_in_future: u64,
    pub check_and_send_address: String,
    #[serde(default)]
    pub dry_run: bool,
}

/// Engine selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineConfig {
    Erc20 { token: String },
    Erc721 { token: String, token_ids: Vec<String> },
    Approval721 { contracts: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_output: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub listen_addr: Option<String>,
}

/// Validated, typed settings consumed by the core
#[derive(Debug, Clone)]
pub struct Settings {
    pub rpc_url: String,
    pub chain_id: Option<u64>,
    pub head_poll_interval: Duration,
    pub relay_url: String,
    pub relay_signer: LocalWallet,
    pub resolution_timeout: Duration,
    pub zero_gas_wallet: LocalWallet,
    pub donor_wallet: LocalWallet,
    pub recipient: Address,
    pub miner_reward: U256,
    pub gas_price_floor: U256,
    pub blocks_in_future: u64,
    pub check_and_send: Address,
    pub dry_run: bool,
    pub engine: EngineKind,
}

/// What the burner needs
#[derive(Debug, Clone)]
pub struct BurnerSettings {
    pub rpc_url: String,
    pub head_poll_interval: Duration,
    pub zero_gas_wallet: LocalWallet,
}

impl Config {
    /// Load config from environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(std::env::var("RESCUE_CONFIG").ok(), |name| std::env::var(name).ok())
    }

    /// An explicit config path must exist; only the default path falls back
    /// to variables when missing.
    pub fn load<F>(explicit_path: Option<String>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = match explicit_path.filter(|p| !p.trim().is_empty()) {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => DEFAULT_CONFIG_PATH.to_string(),
            None => return Self::from_vars(lookup),
        };
        let content = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Build config from a variable lookup. Missing required values are only
    /// reported by [`Config::resolve`].
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let var_or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());
        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match var(name) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber { field: name, value }),
                None => Ok(default),
            }
        };
        let flag = |name: &str| {
            var(name)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };
        let list = |name: &str| -> Vec<String> {
            var(name)
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };

        let chain_id = match var("CHAIN_ID") {
            Some(value) => Some(
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber { field: "CHAIN_ID", value })?,
            ),
            None => None,
        };

        let engine = match var_or("ENGINE", "erc20").to_ascii_lowercase().as_str() {
            "erc20" => EngineConfig::Erc20 {
                token: var_or("TOKEN_ADDRESS", ""),
            },
            "erc721" => EngineConfig::Erc721 {
                token: var_or("TOKEN_ADDRESS", ""),
                token_ids: list("TOKEN_IDS"),
            },
            "approval721" => EngineConfig::Approval721 {
                contracts: list("APPROVAL_CONTRACTS"),
            },
            other => return Err(ConfigError::UnknownEngine(other.to_string())),
        };

        Ok(Self {
            rpc: RpcConfig {
                url: var_or("ETHEREUM_RPC_URL", "http://127.0.0.1:8545"),
                chain_id,
                head_poll_interval_ms: number("HEAD_POLL_INTERVAL_MS", 1_000)?,
            },
            relay: RelayConfig {
                url: var_or("FLASHBOTS_RELAY_URL", "https://relay.flashbots.net"),
                signing_key: var("FLASHBOTS_RELAY_SIGNING_KEY"),
                resolution_timeout_secs: number("RESOLUTION_TIMEOUT_SECS", 120)?,
            },
            accounts: AccountsConfig {
                zero_gas_key: var_or("PRIVATE_KEY_ZERO_GAS", ""),
                donor_key: var_or("PRIVATE_KEY_DONOR", ""),
            },
            bundle: BundleConfig {
                recipient: var_or("RECIPIENT", ""),
                miner_reward_wei: var_or("MINER_REWARD_WEI", DEFAULT_MINER_REWARD_WEI),
                gas_price_floor_gwei: number("GAS_PRICE_FLOOR_IN_GWEI", 30)?,
                blocks_in_future: number("BLOCKS_IN_FUTURE", DEFAULT_BLOCKS_IN_FUTURE)?,
                check_and_send_address: var_or(
                    "CHECK_AND_SEND_CONTRACT_ADDRESS",
                    DEFAULT_CHECK_AND_SEND,
                ),
                dry_run: flag("DRY_RUN"),
            },
            engine,
            logging: LoggingConfig {
                level: var_or("LOG_LEVEL", "info"),
                json_output: flag("LOG_JSON"),
            },
            metrics: MetricsConfig {
                listen_addr: var("METRICS_ADDR"),
            },
        })
    }

    /// Validate everything into typed settings
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let zero_gas_wallet = parse_key("PRIVATE_KEY_ZERO_GAS", &self.accounts.zero_gas_key)?;
        let donor_wallet = parse_key("PRIVATE_KEY_DONOR", &self.accounts.donor_key)?;
        let relay_signer = match &self.relay.signing_key {
            Some(key) => parse_key("FLASHBOTS_RELAY_SIGNING_KEY", key)?,
            None => LocalWallet::new(&mut ethers::core::rand::thread_rng()),
        };

        let recipient = parse_address("RECIPIENT", &self.bundle.recipient)?;
        let check_and_send = parse_address(
            "CHECK_AND_SEND_CONTRACT_ADDRESS",
            &self.bundle.check_and_send_address,
        )?;
        let miner_reward = parse_u256("MINER_REWARD_WEI", &self.bundle.miner_reward_wei)?;
        let gas_price_floor = U256::from(self.bundle.gas_price_floor_gwei) * U256::from(GWEI);

        let engine = match &self.engine {
            EngineConfig::Erc20 { token } => EngineKind::FungibleTransfer {
                token: parse_address("TOKEN_ADDRESS", token)?,
            },
            EngineConfig::Erc721 { token, token_ids } => EngineKind::NonFungibleTransfer {
                token: parse_address("TOKEN_ADDRESS", token)?,
                token_ids: token_ids
                    .iter()
                    .map(|id| parse_u256("TOKEN_IDS", id))
                    .collect::<Result<_, _>>()?,
            },
            EngineConfig::Approval721 { contracts } => EngineKind::ApprovalGrant {
                contracts: contracts
                    .iter()
                    .map(|c| parse_address("APPROVAL_CONTRACTS", c))
                    .collect::<Result<_, _>>()?,
            },
        };

        Ok(Settings {
            rpc_url: self.rpc.url.clone(),
            chain_id: self.rpc.chain_id,
            head_poll_interval: Duration::from_millis(self.rpc.head_poll_interval_ms),
            relay_url: self.relay.url.clone(),
            relay_signer,
            resolution_timeout: Duration::from_secs(self.relay.resolution_timeout_secs),
            zero_gas_wallet,
            donor_wallet,
            recipient,
            miner_reward,
            gas_price_floor,
            blocks_in_future: self.bundle.blocks_in_future,
            check_and_send,
            dry_run: self.bundle.dry_run,
            engine,
        })
    }

    /// Validate only what the burner uses
    pub fn resolve_burner(&self) -> Result<BurnerSettings, ConfigError> {
        Ok(BurnerSettings {
            rpc_url: self.rpc.url.clone(),
            head_poll_interval: Duration::from_millis(self.rpc.head_poll_interval_ms),
            zero_gas_wallet: parse_key("PRIVATE_KEY_ZERO_GAS", &self.accounts.zero_gas_key)?,
        })
    }
}

/// Parse a 0x-prefixed address. Mixed-case input must carry a valid EIP-55 checksum.
pub fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Missing(field));
    }
    let invalid = || ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    };

    let digits = value.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let address: Address = value.parse().map_err(|_| invalid())?;

    let mixed_case = digits.chars().any(|c| c.is_ascii_lowercase())
        && digits.chars().any(|c| c.is_ascii_uppercase());
    if mixed_case && to_checksum(&address, None) != value {
        return Err(invalid());
    }
    Ok(address)
}

fn parse_key(field: &'static str, value: &str) -> Result<LocalWallet, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Missing(field));
    }
    value.parse().map_err(|_| ConfigError::InvalidKey(field))
}

fn parse_u256(field: &'static str, value: &str) -> Result<U256, ConfigError> {
    U256::from_dec_str(value.trim()).map_err(|_| ConfigError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
