//! Configuration management for HashLedger

use crate::blockchain::DEFAULT_DIFFICULTY_PREFIX;
use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL peers use to reach this node. Derived from `port` when unset.
    #[serde(default)]
    pub node_url: Option<String>,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            node_url: None,
            bootstrap_peers: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl NetworkConfig {
    pub fn node_url(&self) -> String {
        self.node_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    /// Required hex prefix of every mined block hash. Shared by the whole network.
    #[serde(default = "default_difficulty_prefix")]
    pub difficulty_prefix: String,
    #[serde(default = "default_reward")]
    pub reward: f64,
    /// Recipient of this node's mining rewards. Random per start when unset.
    #[serde(default)]
    pub node_address: Option<String>,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty_prefix: default_difficulty_prefix(),
            reward: default_reward(),
            node_address: None,
            threads: default_threads(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file is absent.
pub fn load_config(path: &Path) -> Result<Config, ChainError> {
    let config: Config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.network.port == 0 {
            return Err(ChainError::ConfigError("network.port must be non-zero".to_string()));
        }

        let prefix = &self.miner.difficulty_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c == '0') {
            return Err(ChainError::ConfigError(format!(
                "miner.difficulty_prefix must be one or more '0' characters, got {:?}",
                prefix
            )));
        }

        if self.miner.reward.is_nan() || self.miner.reward < 0.0 {
            return Err(ChainError::ConfigError("miner.reward must be non-negative".to_string()));
        }

        if self.miner.threads == 0 {
            return Err(ChainError::ConfigError("miner.threads must be at least 1".to_string()));
        }

        Ok(())
    }
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    10
}

fn default_difficulty_prefix() -> String {
    DEFAULT_DIFFICULTY_PREFIX.to_string()
}

fn default_reward() -> f64 {
    12.5
}

fn default_threads() -> usize {
    1
}

fn default_log_level() -> String {
    "hashledger=info,tower_http=info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
