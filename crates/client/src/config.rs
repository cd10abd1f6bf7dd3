use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stake_types::{
    Address, PoolId, StakeError, StakeResult, DEFAULT_CACHE_NAMESPACE, DEFAULT_CONFIRM_TIMEOUT_MS,
    DEFAULT_DISTRIBUTION_CONTRACT, DEFAULT_POOL_SCAN_BOUND, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_REWARD_POLL_INTERVAL_MS, DEFAULT_TOKEN_CONTRACT, MAX_POOL_SCAN_BOUND,
    PRIMARY_POOL_ID,
};

/// Client configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Distribution (staking) contract
    pub distribution_contract: Address,

    /// Staked token contract
    pub token_contract: Address,

    /// Number of pool indices probed by discovery (`0..pool_scan_bound`)
    pub pool_scan_bound: u32,

    /// Probe pool indices concurrently instead of one at a time
    pub concurrent_discovery: bool,

    /// Pool whose reward is kept live by polling
    pub primary_pool: u32,

    /// Reward refresh period in milliseconds
    pub reward_poll_interval_ms: u64,

    /// Timeout for each chain read in milliseconds
    pub read_timeout_ms: u64,

    /// Timeout while awaiting transaction finality in milliseconds
    pub confirm_timeout_ms: u64,

    /// Local cache configuration
    pub cache: CacheConfig,
}

/// Local cache configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Key namespace
    pub namespace: String,

    /// JSON file backing the cache; in-memory when absent
    pub path: Option<PathBuf>,
}

impl ClientConfig {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> StakeResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StakeError::invalid_config("config", format!("Failed to read config file {}: {}", path, e))
        })?;

        let config: ClientConfig = toml::from_str(&content).map_err(|e| {
            StakeError::invalid_config("config", format!("Failed to parse config file {}: {}", path, e))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> StakeResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StakeError::invalid_config("config", format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content).map_err(|e| {
            StakeError::invalid_config("config", format!("Failed to write config file {}: {}", path, e))
        })?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> StakeResult<()> {
        if self.distribution_contract.is_zero() {
            return Err(StakeError::invalid_config("distribution_contract", "zero address"));
        }

        if self.token_contract.is_zero() {
            return Err(StakeError::invalid_config("token_contract", "zero address"));
        }

        if self.distribution_contract == self.token_contract {
            return Err(StakeError::invalid_config(
                "token_contract",
                "must differ from distribution_contract",
            ));
        }

        if self.pool_scan_bound == 0 || self.pool_scan_bound > MAX_POOL_SCAN_BOUND {
            return Err(StakeError::invalid_config(
                "pool_scan_bound",
                format!("{} not in [1, {}]", self.pool_scan_bound, MAX_POOL_SCAN_BOUND),
            ));
        }

        if self.reward_poll_interval_ms == 0 {
            return Err(StakeError::invalid_config("reward_poll_interval_ms", "must be greater than 0"));
        }

        if self.read_timeout_ms == 0 {
            return Err(StakeError::invalid_config("read_timeout_ms", "must be greater than 0"));
        }

        if self.confirm_timeout_ms < self.read_timeout_ms {
            return Err(StakeError::invalid_config(
                "confirm_timeout_ms",
                format!("must be at least read_timeout_ms ({})", self.read_timeout_ms),
            ));
        }

        if self.cache.namespace.is_empty() || self.cache.namespace.contains(':') {
            return Err(StakeError::invalid_config("cache.namespace", "non-empty and without ':'"));
        }

        Ok(())
    }

    pub fn primary_pool(&self) -> PoolId {
        PoolId(self.primary_pool)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            distribution_contract: parse_default(DEFAULT_DISTRIBUTION_CONTRACT),
            token_contract: parse_default(DEFAULT_TOKEN_CONTRACT),
            pool_scan_bound: DEFAULT_POOL_SCAN_BOUND,
            concurrent_discovery: true,
            primary_pool: PRIMARY_POOL_ID,
            reward_poll_interval_ms: DEFAULT_REWARD_POLL_INTERVAL_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            confirm_timeout_ms: DEFAULT_CONFIRM_TIMEOUT_MS,
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            path: None,
        }
    }
}

// Defaults are compile-time constants known to parse
fn parse_default(address: &str) -> Address {
    Address::from_str(address).unwrap_or_default()
}

/// Create example configuration file
pub fn create_example_config(path: &str) -> StakeResult<()> {
    let example_config = ClientConfig {
        cache: CacheConfig {
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            path: Some(PathBuf::from("./data/stake-cache.json")),
        },
        ..ClientConfig::default()
    };

    example_config.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = ClientConfig::default();
        assert!(config.validate().is_ok());

        config.pool_scan_bound = 0;
        assert!(config.validate().is_err());

        config.pool_scan_bound = MAX_POOL_SCAN_BOUND + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_match_deployed_contracts() {
        let config = ClientConfig::default();
        assert_eq!(
            config.distribution_contract.to_string(),
            "0x850a65da677264bbb7536f8446336c022ecc85dc"
        );
        assert_eq!(config.pool_scan_bound, 10);
        assert_eq!(config.reward_poll_interval_ms, 3_000);
        assert_eq!(config.primary_pool(), PoolId(0));
        assert_eq!(config.confirm_timeout_ms, DEFAULT_CONFIRM_TIMEOUT_MS);
        assert!(config.confirm_timeout_ms >= config.read_timeout_ms);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: ClientConfig = toml::from_str("pool_scan_bound = 4\n[cache]\nnamespace = \"demo\"\n").unwrap();
        assert_eq!(config.pool_scan_bound, 4);
        assert_eq!(config.cache.namespace, "demo");
        assert_eq!(config.reward_poll_interval_ms, DEFAULT_REWARD_POLL_INTERVAL_MS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeouts_must_be_ordered() {
        let config = ClientConfig {
            read_timeout_ms: 5_000,
            confirm_timeout_ms: 1_000,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StakeError::InvalidConfiguration { .. })
        ));
    }
}
