//! Market-data index adapter
//!
//! Keyed API: without `market_data.api_key` the source reports itself
//! disabled and is skipped. Prices come from the on-chain pool listing, with
//! the simple token-price endpoint as fallback.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use oracle_core::{
    same_address, ChainId, Confidence, MarketDataConfig, PriceQuote, SourceError, SourceResult,
    TokenMetadata, DEFAULT_DECIMALS,
};

use super::{deepest, flex, positive, MetadataSource, PriceSource, QuoteRequest};
use crate::client::{RequestExecutor, RequestOptions};

pub const NAME: &str = "market-data";

const API_KEY_HEADER: &str = "x-cg-pro-api-key";

/// Pool candidates checked with a detail lookup during symbol resolution
const MAX_DETAIL_LOOKUPS: usize = 3;

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Pool {
    #[serde(default)]
    attributes: PoolAttributes,
    #[serde(default)]
    relationships: Option<PoolRelationships>,
}

#[derive(Debug, Default, Deserialize)]
struct PoolAttributes {
    #[serde(default)]
    address: Option<String>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    base_token_price_usd: Option<f64>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    base_token_price_native_currency: Option<f64>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    reserve_in_usd: Option<f64>,
    #[serde(default)]
    volume_usd: Option<PoolVolume>,
}

#[derive(Debug, Deserialize)]
struct PoolVolume {
    #[serde(default, deserialize_with = "flex::opt_f64")]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PoolRelationships {
    base_token: Relationship,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    data: RelationshipData,
}

/// `id` is `<network>_<address>`
#[derive(Debug, Deserialize)]
struct RelationshipData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenDetail {
    attributes: TokenAttributes,
}

#[derive(Debug, Deserialize)]
struct TokenAttributes {
    address: String,
    #[serde(default)]
    name: Option<String>,
    symbol: String,
    #[serde(default)]
    decimals: Option<u8>,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    #[serde(default, deserialize_with = "flex::opt_f64")]
    usd: Option<f64>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    usd_24h_vol: Option<f64>,
}

impl Pool {
    fn base_token_address(&self) -> Option<&str> {
        let id = &self.relationships.as_ref()?.base_token.data.id;
        Some(id.rsplit('_').next().unwrap_or(id))
    }

    fn trades_token(&self, address: &str) -> bool {
        self.base_token_address()
            .map(|base| same_address(base, address))
            .unwrap_or(false)
    }
}

/// Adapter for the keyed market-data index
pub struct MarketDataSource {
    executor: Arc<RequestExecutor>,
    config: MarketDataConfig,
}

impl MarketDataSource {
    pub fn new(executor: Arc<RequestExecutor>, config: MarketDataConfig) -> Self {
        Self { executor, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self) -> SourceResult<RequestOptions> {
        let key = self.config.api_key().ok_or(SourceError::NotConfigured(NAME))?;
        Ok(RequestOptions::get().header(API_KEY_HEADER, key))
    }

    /// Deepest pool whose base token is `address`
    async fn pool_quote(&self, chain: ChainId, address: &str) -> SourceResult<PriceQuote> {
        let url = self.url(&format!(
            "/onchain/networks/{}/tokens/{}/pools",
            chain.market_data_network(),
            address
        ));
        let response: ListResponse<Pool> = self
            .executor
            .request_json(&url, self.authorized()?.no_cache())
            .await?;

        let pools: Vec<&Pool> = response
            .data
            .iter()
            .filter(|p| p.trades_token(address) && positive(p.attributes.base_token_price_usd).is_some())
            .collect();

        let idx = deepest(&pools, |p| p.attributes.reserve_in_usd.unwrap_or(0.0))
            .ok_or_else(|| SourceError::upstream(NAME, format!("no priced pools for {address}")))?;
        let pool = &pools[idx].attributes;

        debug!(
            pool = pool.address.as_deref().unwrap_or("unknown"),
            candidates = pools.len(),
            "Selected deepest pool"
        );

        let usd = positive(pool.base_token_price_usd)
            .ok_or_else(|| SourceError::upstream(NAME, "pool has no USD price"))?;
        Ok(PriceQuote::new(NAME, positive(pool.base_token_price_native_currency).unwrap_or(usd))
            .with_usd_price(Some(usd))
            .with_liquidity(pool.reserve_in_usd)
            .with_volume(pool.volume_usd.as_ref().and_then(|v| v.h24)))
    }

    /// Simple token price: USD and 24h volume, no liquidity
    async fn simple_quote(&self, chain: ChainId, address: &str) -> SourceResult<PriceQuote> {
        let url = self.url(&format!("/simple/token_price/{}", chain.market_data_platform()));
        let options = self
            .authorized()?
            .no_cache()
            .query("contract_addresses", address)
            .query("vs_currencies", "usd")
            .query("include_24hr_vol", "true");

        let prices: HashMap<String, SimplePrice> = self.executor.request_json(&url, options).await?;

        let entry = prices
            .iter()
            .find(|(key, _)| same_address(key, address))
            .map(|(_, price)| price)
            .ok_or_else(|| SourceError::upstream(NAME, format!("no simple price for {address}")))?;

        let usd = positive(entry.usd)
            .ok_or_else(|| SourceError::upstream(NAME, "simple price is not positive"))?;
        Ok(PriceQuote::new(NAME, usd)
            .with_usd_price(Some(usd))
            .with_volume(entry.usd_24h_vol))
    }

    async fn token_detail(&self, chain: ChainId, address: &str) -> SourceResult<TokenAttributes> {
        let url = self.url(&format!(
            "/onchain/networks/{}/tokens/{}",
            chain.market_data_network(),
            address
        ));
        let response: ItemResponse<TokenDetail> =
            self.executor.request_json(&url, self.authorized()?).await?;
        Ok(response.data.attributes)
    }
}

#[async_trait]
impl PriceSource for MarketDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn confidence(&self) -> Confidence {
        Confidence::Low
    }

    fn is_enabled(&self) -> bool {
        self.config.api_key().is_some()
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> SourceResult<PriceQuote> {
        let address = request.checked_address()?;
        self.authorized()?;

        match self.pool_quote(request.chain, address).await {
            Ok(quote) => Ok(quote),
            Err(e) => {
                debug!(token = %address, error = %e, "No usable pool, trying simple price");
                self.simple_quote(request.chain, address).await
            }
        }
    }
}

#[async_trait]
impl MetadataSource for MarketDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_enabled(&self) -> bool {
        self.config.api_key().is_some()
    }

    /// Pool search on the chain's network, then a detail lookup of each
    /// candidate base token until one carries the requested symbol
    async fn find_token(&self, symbol: &str, chain: ChainId) -> SourceResult<Option<TokenMetadata>> {
        let symbol = symbol.trim();
        let options = self
            .authorized()?
            .query("query", symbol)
            .query("network", chain.market_data_network());
        let response: ListResponse<Pool> = self
            .executor
            .request_json(&self.url("/onchain/search/pools"), options)
            .await?;

        let mut candidates: Vec<&str> = Vec::new();
        for address in response.data.iter().filter_map(Pool::base_token_address) {
            if !candidates.iter().any(|c| same_address(c, address)) {
                candidates.push(address);
            }
        }

        for address in candidates.into_iter().take(MAX_DETAIL_LOOKUPS) {
            let detail = match self.token_detail(chain, address).await {
                Ok(detail) => detail,
                Err(e) => {
                    debug!(token = %address, error = %e, "Token detail lookup failed");
                    continue;
                }
            };

            if detail.symbol.eq_ignore_ascii_case(symbol) {
                let name = detail.name.as_deref().unwrap_or(&detail.symbol);
                return Ok(Some(
                    TokenMetadata::new(&detail.symbol, name, &detail.address, chain)
                        .with_decimals(detail.decimals.unwrap_or(DEFAULT_DECIMALS))
                        .with_logo(detail.image_url.clone()),
                ));
            }
        }

        Ok(None)
    }
}
