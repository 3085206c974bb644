//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via CRYPTOWALLET_CONFIG)
//! 3. Environment variables

use cryptowallet_core::source::{COINAPI_BASE_URL, DEFAULT_MAX_ASSETS};
use cryptowallet_core::Offering;
use cryptowallet_protocol::{DEFAULT_PORT, MAX_LINE_BYTES};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub market: MarketConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("CRYPTOWALLET_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a key lookup (the process environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.network.apply_overrides(&lookup);
        self.storage.apply_overrides(&lookup);
        self.market.apply_overrides(&lookup);
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;
        self.market.validate()
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Bytes read from a socket per read call.
    pub read_buffer_size: usize,
    /// Longest accepted request line.
    pub max_line_bytes: usize,
    /// Responses queued per connection before a slow reader is dropped.
    pub write_queue_size: usize,
    /// Seconds a single response write may take.
    pub write_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 1000,
            read_buffer_size: 2048,
            max_line_bytes: MAX_LINE_BYTES,
            write_queue_size: 64,
            write_timeout_secs: 10,
        }
    }
}

impl NetworkConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("CRYPTOWALLET_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Some(max) = lookup("CRYPTOWALLET_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }

        if let Some(size) = lookup("CRYPTOWALLET_READ_BUFFER") {
            if let Ok(n) = size.parse() {
                self.read_buffer_size = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "read_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_line_bytes must be at least 1".to_string(),
            ));
        }
        if self.write_queue_size == 0 {
            return Err(ConfigError::ValidationError(
                "write_queue_size must be at least 1".to_string(),
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "write_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding users and their wallets.
    pub users_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_file: PathBuf::from("./data/users.json"),
        }
    }
}

impl StorageConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("CRYPTOWALLET_USERS_FILE") {
            self.users_file = PathBuf::from(path);
        }
    }
}

/// Where prices come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourceKind {
    /// The offerings listed in the config.
    #[default]
    Static,
    /// The CoinAPI REST API.
    CoinApi,
}

/// A configured static offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingConfig {
    pub asset_id: String,
    pub name: String,
    pub price: f64,
}

/// Market data configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub source: PriceSourceKind,
    /// CoinAPI key (required for the coinapi source).
    pub api_key: Option<String>,
    pub base_url: String,
    /// Seconds between catalog refreshes.
    pub refresh_interval_secs: u64,
    /// Most assets kept from a CoinAPI fetch.
    pub max_assets: usize,
    /// Offerings served by the static source.
    pub offerings: Vec<OfferingConfig>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let offering = |asset_id: &str, name: &str, price: f64| OfferingConfig {
            asset_id: asset_id.to_string(),
            name: name.to_string(),
            price,
        };

        Self {
            source: PriceSourceKind::Static,
            api_key: None,
            base_url: COINAPI_BASE_URL.to_string(),
            refresh_interval_secs: 30 * 60,
            max_assets: DEFAULT_MAX_ASSETS,
            offerings: vec![
                offering("BTC", "Bitcoin", 67_000.0),
                offering("ETH", "Ethereum", 3_500.0),
                offering("SOL", "Solana", 150.0),
                offering("LTC", "Litecoin", 80.0),
                offering("DOGE", "Dogecoin", 0.15),
            ],
        }
    }
}

impl MarketConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(source) = lookup("CRYPTOWALLET_MARKET_SOURCE") {
            match source.to_lowercase().as_str() {
                "static" => self.source = PriceSourceKind::Static,
                "coinapi" => self.source = PriceSourceKind::CoinApi,
                _ => {}
            }
        }

        if let Some(key) = lookup("COINAPI_KEY") {
            self.api_key = Some(key);
        }

        if let Some(secs) = lookup("CRYPTOWALLET_REFRESH_SECS") {
            if let Ok(n) = secs.parse() {
                self.refresh_interval_secs = n;
            }
        }
    }

    /// Returns the refresh interval as Duration.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Returns the configured API key, if it is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Converts the static offerings into validated offerings.
    pub fn static_offerings(&self) -> Result<Vec<Offering>, ConfigError> {
        self.offerings
            .iter()
            .map(|o| {
                Offering::new(o.asset_id.clone(), o.name.clone(), o.price)
                    .map_err(|e| ConfigError::ValidationError(e.to_string()))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "refresh_interval_secs must be at least 1".to_string(),
            ));
        }

        match self.source {
            PriceSourceKind::Static => {
                if self.offerings.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "static market source needs at least one offering".to_string(),
                    ));
                }
                self.static_offerings()?;
            }
            PriceSourceKind::CoinApi => {
                if self.api_key().is_none() {
                    return Err(ConfigError::ValidationError(
                        "coinapi market source enabled but api_key not set".to_string(),
                    ));
                }
                if self.max_assets == 0 {
                    return Err(ConfigError::ValidationError(
                        "max_assets must be at least 1".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde helpers for SocketAddr (stored as a string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
