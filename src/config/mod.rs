use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml, Yaml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};

/// Chain id that enables the Ethereum collection path by default.
pub const DEFAULT_ETHEREUM_NETWORK: &str = "0g-galileo-testnet";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "ZEROG_";

/// Exporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the metrics endpoint binds to
    pub listen_address: String,
    /// Seconds between scrapes
    pub metrics_interval: u64,
    /// Seconds a single scrape may take across all collection paths
    pub scrape_timeout: u64,
    /// Liveness window and block time settings
    pub block_tracking: BlockTracking,
    /// Monitored chains
    pub chains: Vec<ChainConfig>,
    /// Log output settings
    pub logging: LoggingConfig,
    /// Optional Ethereum endpoint
    pub ethereum: Option<EthereumConfig>,
}

/// Liveness window and block time settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockTracking {
    /// Whether the liveness window is scanned
    pub enabled: bool,
    /// Number of trailing heights scanned
    pub window: u64,
    /// Number of block intervals kept by the estimator
    pub history_size: usize,
    /// Miss streak that triggers a warning, `0` disables it
    pub max_consecutive_missed: u64,
    /// Block time in seconds to seed the estimator with
    pub initial_block_time: Option<f64>,
}

/// A monitored Cosmos chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain id, used as the `chain_id` label
    pub chain_id: String,
    /// Human readable name
    #[serde(default)]
    pub name: String,
    /// CometBFT rpc url
    pub rpc: String,
    /// Consensus addresses of the tracked validators
    #[serde(default)]
    pub validators: Vec<String>,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level of the crate's own logs
    pub level: String,
    /// Terminal output format
    pub format: LogFormat,
    /// Directory for rolling log files, disabled when unset
    pub directory: Option<PathBuf>,
    /// Log file rotation: `minutely`, `hourly`, `daily` or `never`
    pub rotation: String,
}

/// Terminal log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Coloured human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Ethereum endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthereumConfig {
    /// JSON-RPC url
    pub rpc_url: String,
    /// Hex encoded 256 bit JWT secret
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Staking contract whose reachability is reported
    #[serde(default)]
    pub staking_contract: Option<String>,
    /// Chain id the Ethereum path runs for
    #[serde(default = "default_network")]
    pub network: String,
    /// Addresses whose balance is reported
    #[serde(default)]
    pub addresses: Vec<EthereumAddress>,
}

/// A labelled Ethereum address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthereumAddress {
    /// Hex address
    pub address: String,
    /// Label value
    #[serde(default)]
    pub name: String,
}

fn default_network() -> String {
    DEFAULT_ETHEREUM_NETWORK.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9200".to_string(),
            metrics_interval: 15,
            scrape_timeout: 5,
            block_tracking: BlockTracking::default(),
            chains: Vec::new(),
            logging: LoggingConfig::default(),
            ethereum: None,
        }
    }
}

impl Default for BlockTracking {
    fn default() -> Self {
        Self {
            enabled: true,
            window: crate::liveness::DEFAULT_WINDOW,
            history_size: crate::block_time::DEFAULT_HISTORY_SIZE,
            max_consecutive_missed: 0,
            initial_block_time: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
            rotation: "daily".to_string(),
        }
    }
}

impl Config {
    /// Loads the config from defaults, the file at `config_path` (YAML or TOML
    /// by extension; a missing file is skipped), `ZEROG_` environment
    /// variables and `cli_config`, in increasing precedence.
    pub fn new(config_path: &Path, cli_config: impl Provider) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        figment = match config_path.extension().and_then(|ext| ext.to_str()) {
            Some("yml") | Some("yaml") => figment.merge(Yaml::file(config_path)),
            _ => figment.merge(Toml::file(config_path)),
        };

        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(cli_config)
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the values a scrape relies on.
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            eyre::bail!("no chains configured");
        }

        for chain in &self.chains {
            if chain.chain_id.trim().is_empty() {
                eyre::bail!("chain with rpc {:?} has no chain_id", chain.rpc);
            }
            if chain.rpc.trim().is_empty() {
                eyre::bail!("chain {} has no rpc url", chain.chain_id);
            }
        }

        if self.metrics_interval == 0 {
            eyre::bail!("metrics_interval must be positive");
        }
        if self.scrape_timeout == 0 {
            eyre::bail!("scrape_timeout must be positive");
        }
        if self.block_tracking.window == 0 {
            eyre::bail!("block_tracking.window must be positive");
        }

        Ok(())
    }

    /// Time between scrapes.
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval)
    }

    /// Deadline of a single scrape.
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use figment::{value::Value, Jail};

    use super::*;

    const CONFIG: &str = r#"
listen_address: "0.0.0.0:26660"
metrics_interval: 30
block_tracking:
  window: 50
  max_consecutive_missed: 5
chains:
  - chain_id: "0g-galileo-testnet"
    name: "0G Galileo"
    rpc: "http://localhost:26657"
    validators:
      - "30535EF0D596876C5DBFCF825D64134550AB4945"
logging:
  level: debug
  format: json
ethereum:
  rpc_url: "http://localhost:8545"
  addresses:
    - address: "0x00092f31B30461501CA6311Fc225f8f1ddFbE67e"
      name: "validator"
"#;

    fn no_overrides() -> Serialized<HashMap<&'static str, Value>> {
        Serialized::defaults(HashMap::new())
    }

    #[test]
    fn loads_yaml_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yml", CONFIG)?;

            let config =
                Config::new(Path::new("config.yml"), no_overrides()).map_err(|e| e.to_string())?;

            assert_eq!(config.listen_address, "0.0.0.0:26660");
            assert_eq!(config.metrics_interval(), Duration::from_secs(30));
            assert_eq!(config.scrape_timeout(), Duration::from_secs(5));
            assert_eq!(config.block_tracking.window, 50);
            assert_eq!(config.block_tracking.history_size, 100);
            assert!(config.block_tracking.enabled);
            assert_eq!(config.chains[0].validators.len(), 1);
            assert_eq!(config.logging.format, LogFormat::Json);
            assert_eq!(config.logging.rotation, "daily");

            let ethereum = config.ethereum.expect("ethereum section");
            assert_eq!(ethereum.network, DEFAULT_ETHEREUM_NETWORK);
            assert_eq!(ethereum.jwt_secret, None);
            Ok(())
        });
    }

    #[test]
    fn env_and_cli_take_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yml", CONFIG)?;
            jail.set_env("ZEROG_METRICS_INTERVAL", "60");
            jail.set_env("ZEROG_BLOCK_TRACKING__WINDOW", "20");
            jail.set_env("ZEROG_LISTEN_ADDRESS", "0.0.0.0:1");

            let cli = Serialized::default("listen_address", "127.0.0.1:9300");
            let config = Config::new(Path::new("config.yml"), cli).map_err(|e| e.to_string())?;

            assert_eq!(config.metrics_interval, 60);
            assert_eq!(config.block_tracking.window, 20);
            assert_eq!(config.listen_address, "127.0.0.1:9300");
            Ok(())
        });
    }

    #[test]
    fn loads_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "exporter.toml",
                r#"
                scrape_timeout = 3

                [[chains]]
                chain_id = "0g-newton-testnet"
                rpc = "http://localhost:26657"
                "#,
            )?;

            let config = Config::new(Path::new("exporter.toml"), no_overrides())
                .map_err(|e| e.to_string())?;

            assert_eq!(config.scrape_timeout, 3);
            assert_eq!(config.chains[0].chain_id, "0g-newton-testnet");
            assert!(config.chains[0].validators.is_empty());
            assert!(config.ethereum.is_none());
            Ok(())
        });
    }

    #[test]
    fn rejects_invalid_configs() {
        Jail::expect_with(|_| {
            let err = Config::new(Path::new("missing.yml"), no_overrides()).unwrap_err();
            assert!(err.to_string().contains("no chains"));
            Ok(())
        });

        let mut config = Config {
            chains: vec![ChainConfig {
                chain_id: "0g".into(),
                name: String::new(),
                rpc: "http://localhost:26657".into(),
                validators: Vec::new(),
            }],
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.block_tracking.window = 0;
        assert!(config.validate().is_err());

        config.block_tracking.window = 10;
        config.chains[0].rpc = String::new();
        assert!(config.validate().is_err());
    }
}
