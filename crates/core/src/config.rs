//! Configuration types
//!
//! Loaded from defaults, then `.env`, then `PRICE_ORACLE__*` environment
//! variables (e.g. `PRICE_ORACLE__MARKET_DATA__API_KEY`).

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ChainId, ConfigError};

const ENV_PREFIX: &str = "PRICE_ORACLE";

/// Internal multi-exchange aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalAggregatorConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Chains served by a dedicated `/price/<chain>` endpoint
    pub chain_endpoints: Vec<ChainId>,
}

impl Default for InternalAggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/api".to_string(),
            api_key: None,
            chain_endpoints: vec![
                ChainId::Ethereum,
                ChainId::Bsc,
                ChainId::Polygon,
                ChainId::Arbitrum,
                ChainId::Base,
            ],
        }
    }
}

impl InternalAggregatorConfig {
    pub fn api_key(&self) -> Option<&str> {
        non_empty(&self.api_key)
    }

    pub fn has_chain_endpoint(&self, chain: ChainId) -> bool {
        self.chain_endpoints.contains(&chain)
    }
}

/// Public DEX index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexIndexConfig {
    pub base_url: String,
}

impl Default for DexIndexConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dexscreener.com/latest/dex".to_string(),
        }
    }
}

/// Public market-data index, only used when an API key is present
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pro-api.coingecko.com/api/v3".to_string(),
            api_key: None,
        }
    }
}

impl MarketDataConfig {
    pub fn api_key(&self) -> Option<&str> {
        non_empty(&self.api_key)
    }
}

/// Request executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub cache_ttl_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            cache_ttl_ms: 30_000,
        }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Orchestrator and resolver cache lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub price_ttl_ms: u64,
    pub metadata_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            price_ttl_ms: 10_000,
            metadata_ttl_ms: 3_600_000,
        }
    }
}

impl CacheConfig {
    pub fn price_ttl(&self) -> Duration {
        Duration::from_millis(self.price_ttl_ms)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_millis(self.metadata_ttl_ms)
    }
}

/// Batch fetch throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub chunk_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            chunk_delay_ms: 100,
        }
    }
}

impl BatchConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

/// Polling stream defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub interval_ms: u64,
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            channel_capacity: 256,
        }
    }
}

impl StreamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Complete oracle configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleConfig {
    pub default_chain: ChainId,
    pub internal: InternalAggregatorConfig,
    pub dex_index: DexIndexConfig,
    pub market_data: MarketDataConfig,
    pub request: RequestConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub stream: StreamConfig,
}

impl OracleConfig {
    /// Load configuration from `.env` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let chain_endpoints: Vec<&str> = defaults
            .internal
            .chain_endpoints
            .iter()
            .map(|c| c.name())
            .collect();

        let config = Config::builder()
            .set_default("default_chain", defaults.default_chain.name())?
            // Internal aggregator
            .set_default("internal.base_url", defaults.internal.base_url.as_str())?
            .set_default("internal.chain_endpoints", chain_endpoints)?
            // Public indexes
            .set_default("dex_index.base_url", defaults.dex_index.base_url.as_str())?
            .set_default("market_data.base_url", defaults.market_data.base_url.as_str())?
            // Request executor
            .set_default("request.timeout_ms", defaults.request.timeout_ms)?
            .set_default("request.max_retries", defaults.request.max_retries as u64)?
            .set_default("request.retry_base_delay_ms", defaults.request.retry_base_delay_ms)?
            .set_default("request.cache_ttl_ms", defaults.request.cache_ttl_ms)?
            // Caches
            .set_default("cache.price_ttl_ms", defaults.cache.price_ttl_ms)?
            .set_default("cache.metadata_ttl_ms", defaults.cache.metadata_ttl_ms)?
            // Batching and streaming
            .set_default("batch.chunk_size", defaults.batch.chunk_size as u64)?
            .set_default("batch.chunk_delay_ms", defaults.batch.chunk_delay_ms)?
            .set_default("stream.interval_ms", defaults.stream.interval_ms)?
            .set_default("stream.channel_capacity", defaults.stream.channel_capacity as u64)?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("internal.chain_endpoints"),
            )
            .build()?;

        let loaded: OracleConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("internal.base_url", &self.internal.base_url),
            ("dex_index.base_url", &self.dex_index.base_url),
            ("market_data.base_url", &self.market_data.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!("{name} must be an http(s) URL: {url}")));
            }
        }
        if self.batch.chunk_size == 0 {
            return Err(ConfigError::Invalid("batch.chunk_size must be positive".into()));
        }
        if self.stream.interval_ms == 0 {
            return Err(ConfigError::Invalid("stream.interval_ms must be positive".into()));
        }
        if self.request.timeout_ms == 0 {
            return Err(ConfigError::Invalid("request.timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Summary without secrets, for startup logging
    pub fn digest(&self) -> String {
        format!(
            "default_chain={} internal={} internal_key={} market_data_key={} retries={} price_ttl={}ms",
            self.default_chain,
            self.internal.base_url,
            self.internal.api_key().is_some(),
            self.market_data.api_key().is_some(),
            self.request.max_retries,
            self.cache.price_ttl_ms,
        )
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
