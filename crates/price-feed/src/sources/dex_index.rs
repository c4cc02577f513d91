//! Public DEX index adapter
//!
//! Pair-centric, unauthenticated. A token usually trades in many pairs; the
//! quote comes from the pair with the deepest USD liquidity on the target
//! chain.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use oracle_core::{
    same_address, ChainId, Confidence, DexIndexConfig, PriceQuote, SourceError, SourceResult,
    TokenMetadata,
};

use super::{deepest, flex, positive, MetadataSource, PriceSource, QuoteRequest};
use crate::client::{RequestExecutor, RequestOptions};

pub const NAME: &str = "dex-index";

#[derive(Debug, Default, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
    /// Single-pair lookups may answer with `pair` instead
    #[serde(default)]
    pair: Option<DexPair>,
}

impl PairsResponse {
    fn into_pairs(self) -> Vec<DexPair> {
        let mut pairs = self.pairs.unwrap_or_default();
        pairs.extend(self.pair);
        pairs
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    chain_id: String,
    #[serde(default)]
    dex_id: Option<String>,
    pair_address: String,
    base_token: PairToken,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    price_native: Option<f64>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    price_usd: Option<f64>,
    #[serde(default)]
    liquidity: Option<PairLiquidity>,
    #[serde(default)]
    volume: Option<PairVolume>,
    #[serde(default)]
    info: Option<PairInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct PairToken {
    address: String,
    #[serde(default)]
    name: Option<String>,
    symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PairLiquidity {
    #[serde(default, deserialize_with = "flex::opt_f64")]
    usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PairVolume {
    #[serde(default, deserialize_with = "flex::opt_f64")]
    h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairInfo {
    #[serde(default)]
    image_url: Option<String>,
}

impl DexPair {
    fn liquidity_usd(&self) -> Option<f64> {
        self.liquidity.as_ref().and_then(|l| l.usd)
    }

    fn volume_24h(&self) -> Option<f64> {
        self.volume.as_ref().and_then(|v| v.h24)
    }

    fn on_chain(&self, chain: ChainId) -> bool {
        self.chain_id.eq_ignore_ascii_case(chain.dex_index_slug())
    }

    fn quote(&self) -> SourceResult<PriceQuote> {
        let usd = positive(self.price_usd).ok_or_else(|| {
            SourceError::upstream(NAME, format!("pair {} has no USD price", self.pair_address))
        })?;

        Ok(PriceQuote::new(NAME, positive(self.price_native).unwrap_or(usd))
            .with_usd_price(Some(usd))
            .with_liquidity(self.liquidity_usd())
            .with_volume(self.volume_24h()))
    }

    fn metadata(&self, chain: ChainId) -> TokenMetadata {
        let name = self.base_token.name.as_deref().unwrap_or(&self.base_token.symbol);
        TokenMetadata::new(&self.base_token.symbol, name, &self.base_token.address, chain)
            .with_logo(self.info.as_ref().and_then(|i| i.image_url.clone()))
    }
}

/// Adapter for the public DEX index
pub struct DexIndexSource {
    executor: Arc<RequestExecutor>,
    config: DexIndexConfig,
}

impl DexIndexSource {
    pub fn new(executor: Arc<RequestExecutor>, config: DexIndexConfig) -> Self {
        Self { executor, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_pairs(&self, url: &str, options: RequestOptions) -> SourceResult<Vec<DexPair>> {
        let response: PairsResponse = self.executor.request_json(url, options).await?;
        Ok(response.into_pairs())
    }

    /// Quote for one specific pair
    async fn pair_quote(&self, chain: ChainId, pair: &str) -> SourceResult<PriceQuote> {
        let url = self.url(&format!("/pairs/{}/{}", chain.dex_index_slug(), pair));
        let pairs = self.get_pairs(&url, RequestOptions::get().no_cache()).await?;

        pairs
            .iter()
            .find(|p| same_address(&p.pair_address, pair))
            .ok_or_else(|| SourceError::upstream(NAME, format!("pair {pair} not found")))?
            .quote()
    }

    /// Quote from the deepest pair trading the token on its chain
    async fn token_quote(&self, chain: ChainId, address: &str) -> SourceResult<PriceQuote> {
        let url = self.url(&format!("/tokens/{address}"));
        let pairs: Vec<DexPair> = self
            .get_pairs(&url, RequestOptions::get().no_cache())
            .await?
            .into_iter()
            .filter(|p| p.on_chain(chain) && same_address(&p.base_token.address, address))
            .collect();

        let idx = deepest(&pairs, |p| p.liquidity_usd().unwrap_or(0.0)).ok_or_else(|| {
            SourceError::upstream(NAME, format!("no {} pairs for {address}", chain.name()))
        })?;

        let pair = &pairs[idx];
        debug!(
            pair = %pair.pair_address,
            dex = pair.dex_id.as_deref().unwrap_or("unknown"),
            candidates = pairs.len(),
            "Selected deepest pair"
        );
        pair.quote()
    }
}

#[async_trait]
impl PriceSource for DexIndexSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> SourceResult<PriceQuote> {
        match request.checked_pair()? {
            Some(pair) => self.pair_quote(request.chain, pair).await,
            None => self.token_quote(request.chain, request.checked_address()?).await,
        }
    }
}

#[async_trait]
impl MetadataSource for DexIndexSource {
    fn name(&self) -> &'static str {
        NAME
    }

    /// First pair on `chain` whose base token symbol matches exactly,
    /// ignoring case
    async fn find_token(&self, symbol: &str, chain: ChainId) -> SourceResult<Option<TokenMetadata>> {
        let symbol = symbol.trim();
        let pairs = self
            .get_pairs(&self.url("/search"), RequestOptions::get().query("q", symbol))
            .await?;

        Ok(pairs
            .iter()
            .find(|p| p.on_chain(chain) && p.base_token.symbol.eq_ignore_ascii_case(symbol))
            .map(|p| p.metadata(chain)))
    }
}
