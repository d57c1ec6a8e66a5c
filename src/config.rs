// Node configuration

use crate::consensus::Target;
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const GENESIS_COINBASE_DATA: &str = "The Times 22/Jan/2017 Now I have nice gopher";
pub const EMISSION_VALUE: u64 = 1_000_000;
pub const MINING_REWARD: u64 = 10;
pub const TARGET_BITS: u32 = 16;

/// Ledger settings, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding one database per node
    pub data_dir: PathBuf,
    pub node_id: String,
    /// Required leading zero bits of a block hash
    pub target_bits: u32,
    /// Value of the genesis coinbase
    pub emission_value: u64,
    /// Value of the coinbase paid to whoever mines a block
    pub mining_reward: u64,
    pub genesis_data: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            node_id: "1".to_string(),
            target_bits: TARGET_BITS,
            emission_value: EMISSION_VALUE,
            mining_reward: MINING_REWARD,
            genesis_data: GENESIS_COINBASE_DATA.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load from a JSON file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                let json = fs::read_to_string(path)?;
                serde_json::from_str(&json).map_err(|e| {
                    LedgerError::Config(format!("{}: {}", path.display(), e))
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Target::from_leading_zero_bits(self.target_bits)?;
        if self.node_id.is_empty() {
            return Err(LedgerError::Config("node_id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Database directory for this node
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("db_{}", self.node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.emission_value, 1_000_000);
        assert_eq!(config.db_path(), PathBuf::from("./data/db_1"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{ "node_id": "3000", "target_bits": 12 }"#).unwrap();
        assert_eq!(config.node_id, "3000");
        assert_eq!(config.target_bits, 12);
        assert_eq!(config.mining_reward, MINING_REWARD);
    }

    #[test]
    fn test_invalid_target_bits() {
        let config = LedgerConfig {
            target_bits: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_load_without_path() {
        assert_eq!(LedgerConfig::load(None).unwrap(), LedgerConfig::default());
    }
}
