//! Wallet and ledger configuration with TOML support

use crate::constants::{DEFAULT_BLOCK_REWARD, MAX_COST};
use crate::error::{ColoredCoinError, Result};
use crate::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Configuration for one wallet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Label used in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// 32-byte key seed, hex encoded
    #[serde(default = "default_seed")]
    pub seed: String,

    /// Evaluation budget when replaying puzzles
    #[serde(default = "default_max_cost")]
    pub max_cost: u64,
}

/// Configuration for the ledger simulator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Reward paid to the coinbase puzzle hash of every block
    #[serde(default = "default_block_reward")]
    pub block_reward: u64,

    /// Evaluation budget per spend
    #[serde(default = "default_max_cost")]
    pub max_cost: u64,
}

/// Configuration for the `cc-sim` runnable
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// "human" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_name() -> String {
    "wallet".to_string()
}

fn default_seed() -> String {
    hex::encode([0u8; 32])
}

fn default_max_cost() -> u64 {
    MAX_COST
}

fn default_block_reward() -> u64 {
    DEFAULT_BLOCK_REWARD
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn from_toml_file<T: for<'de> Deserialize<'de>>(path: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| ColoredCoinError::Config(e.to_string()))?;
    Ok(toml::from_str(&content)?)
}

impl WalletConfig {
    pub fn new(name: &str, seed: [u8; 32]) -> Self {
        Self { name: name.to_string(), seed: hex::encode(seed), max_cost: default_max_cost() }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: &str) -> Result<Self> {
        from_toml_file(path)
    }

    /// Decoded key seed
    pub fn seed_bytes(&self) -> Result<[u8; 32]> {
        let bytes = hex::decode(&self.seed).map_err(|e| ColoredCoinError::Config(format!("seed: {}", e)))?;
        bytes.try_into().map_err(|bytes: Vec<u8>| {
            ColoredCoinError::Config(format!("seed is {} bytes, expected 32", bytes.len()))
        })
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self { name: default_name(), seed: default_seed(), max_cost: default_max_cost() }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { block_reward: default_block_reward(), max_cost: default_max_cost() }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

impl SimConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: &str) -> Result<Self> {
        from_toml_file(path)
    }

    pub fn log_format(&self) -> Result<LogFormat> {
        match self.log_format.as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(ColoredCoinError::Config(format!("unknown log format {:?}", other))),
        }
    }
}
