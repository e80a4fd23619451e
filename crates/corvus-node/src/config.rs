//! Node configuration.

use crate::Args;
use anyhow::{bail, Context, Result};
use corvus_miner::{DEFAULT_BLOCK_MAX_SIZE, DEFAULT_BLOCK_MIN_TX_FEE};
use corvus_types::Amount;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network (main, test, regtest).
    pub network: String,
    /// RPC configuration.
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Mining configuration.
    #[serde(default)]
    pub mining: MiningConfig,
    /// Staking configuration.
    #[serde(default)]
    pub staking: StakingConfig,
}

/// RPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// RPC bind address.
    pub bind_address: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9452".to_string(),
        }
    }
}

/// Mining configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Start PoW generation at startup.
    pub enabled: bool,
    /// Generation threads; -1 selects hardware concurrency.
    pub threads: i32,
    /// Soft cap on assembled block size in bytes.
    pub block_max_size: u64,
    /// Minimum fee rate for block inclusion, per kB.
    pub block_min_tx_fee: Amount,
    /// Block version override for test networks.
    pub block_version: Option<i32>,
    /// Coinbase destination script, hex encoded.
    pub coinbase_script: Option<String>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threads: -1,
            block_max_size: DEFAULT_BLOCK_MAX_SIZE,
            block_min_tx_fee: DEFAULT_BLOCK_MIN_TX_FEE,
            block_version: None,
            coinbase_script: None,
        }
    }
}

/// Staking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Run the stake miner (requires a wallet).
    pub enabled: bool,
    /// Balance withheld from staking, in base units.
    pub reserve_balance: Amount,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reserve_balance: 0,
        }
    }
}

/// Hard ceiling used to validate `block_max_size` before the network is
/// known; the assembler clamps further per build.
const MAX_CONFIG_BLOCK_SIZE: u64 = 2_000_000 - 1_000;

impl NodeConfig {
    /// Load configuration from file and CLI args.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("failed to read config file")?;
            toml::from_str(&content).context("failed to parse config file")?
        } else {
            Self::default_for_network(&args.network)
        };

        config.network = args.network.clone();
        if args.gen {
            config.mining.enabled = true;
        }
        if let Some(threads) = args.genproclimit {
            config.mining.threads = threads;
        }
        if let Some(size) = args.blockmaxsize {
            config.mining.block_max_size = size;
        }
        if let Some(fee) = args.blockmintxfee {
            config.mining.block_min_tx_fee = fee;
        }
        if let Some(version) = args.blockversion {
            config.mining.block_version = Some(version);
        }
        if let Some(ref bind) = args.rpc_bind {
            config.rpc.bind_address = bind.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Default config for a network.
    pub fn default_for_network(network: &str) -> Self {
        NodeConfig {
            network: network.to_string(),
            rpc: RpcConfig::default(),
            mining: MiningConfig::default(),
            staking: StakingConfig::default(),
        }
    }

    /// Reject invalid option values before anything starts.
    pub fn validate(&self) -> Result<()> {
        if corvus_consensus::ChainParams::for_network(&self.network).is_none() {
            bail!("unknown network: {}", self.network);
        }
        if self.mining.block_max_size < 1_000 || self.mining.block_max_size > MAX_CONFIG_BLOCK_SIZE
        {
            bail!(
                "block_max_size {} outside the legal range [1000, {}]",
                self.mining.block_max_size,
                MAX_CONFIG_BLOCK_SIZE
            );
        }
        if self.mining.block_min_tx_fee < 0 {
            bail!("block_min_tx_fee cannot be negative");
        }
        if self.staking.reserve_balance < 0 {
            bail!("reserve_balance cannot be negative");
        }
        if let Some(ref script) = self.mining.coinbase_script {
            if corvus_types::Script::from_hex(script).is_err() {
                bail!("coinbase_script is not valid hex");
            }
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default_for_network("main");
        assert!(config.validate().is_ok());
        assert!(!config.mining.enabled);
    }

    #[test]
    fn test_rejects_unknown_network() {
        let config = NodeConfig::default_for_network("moonnet");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_block_size_out_of_range() {
        let mut config = NodeConfig::default_for_network("regtest");
        config.mining.block_max_size = 999;
        assert!(config.validate().is_err());
        config.mining.block_max_size = 3_000_000;
        assert!(config.validate().is_err());
        config.mining.block_max_size = 1_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_reserve() {
        let mut config = NodeConfig::default_for_network("regtest");
        config.staking.reserve_balance = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_coinbase_script() {
        let mut config = NodeConfig::default_for_network("regtest");
        config.mining.coinbase_script = Some("zz".to_string());
        assert!(config.validate().is_err());
        config.mining.coinbase_script = Some("51".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corvus-node.toml");
        let mut config = NodeConfig::default_for_network("regtest");
        config.mining.enabled = true;
        config.mining.threads = 2;
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: NodeConfig = toml::from_str(&content).unwrap();
        assert_eq!(loaded.network, "regtest");
        assert!(loaded.mining.enabled);
        assert_eq!(loaded.mining.threads, 2);
    }
}
