//! Source adapters
//!
//! Each adapter owns one explicit decoder for its vendor's payload and
//! produces the shared `PriceQuote` / `TokenMetadata` shapes. A payload
//! without a usable price is a typed `SourceError::UpstreamData`.

pub mod dex_index;
pub mod internal;
pub mod market_data;

use async_trait::async_trait;

use oracle_core::{validate_address, ChainId, Confidence, PriceQuote, SourceError, SourceResult, TokenMetadata};

pub use dex_index::DexIndexSource;
pub use internal::{InternalAggregatorSource, ServiceHealth};
pub use market_data::MarketDataSource;

/// What a price source needs to look a token up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub symbol: String,
    pub address: String,
    pub chain: ChainId,
    pub pair_address: Option<String>,
}

impl QuoteRequest {
    pub fn for_token(token: &TokenMetadata, pair_address: Option<&str>) -> Self {
        Self {
            symbol: token.symbol.clone(),
            address: token.address.clone(),
            chain: token.chain,
            pair_address: pair_address.map(str::to_string),
        }
    }

    /// Token address, checked before any network call
    pub(crate) fn checked_address(&self) -> SourceResult<&str> {
        checked(&self.address)
    }

    pub(crate) fn checked_pair(&self) -> SourceResult<Option<&str>> {
        self.pair_address.as_deref().map(checked).transpose()
    }
}

fn checked(address: &str) -> SourceResult<&str> {
    validate_address(address).map_err(|_| SourceError::InvalidAddress(address.to_string()))?;
    Ok(address.trim())
}

/// A vendor able to price a token
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Trust label attached to prices this source wins with
    fn confidence(&self) -> Confidence;

    /// Disabled sources are skipped without being reported as failures
    fn is_enabled(&self) -> bool {
        true
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> SourceResult<PriceQuote>;

    /// Every quote the source can offer for aggregation
    async fn fetch_quotes(&self, request: &QuoteRequest) -> SourceResult<Vec<PriceQuote>> {
        Ok(vec![self.fetch_quote(request).await?])
    }
}

/// A vendor able to map a symbol to an on-chain token
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_enabled(&self) -> bool {
        true
    }

    async fn find_token(&self, symbol: &str, chain: ChainId) -> SourceResult<Option<TokenMetadata>>;
}

/// Keep only finite, strictly positive prices
pub(crate) fn positive(price: Option<f64>) -> Option<f64> {
    price.filter(|p| p.is_finite() && *p > 0.0)
}

/// Index of the entry with the greatest liquidity; ties keep the first
pub(crate) fn deepest<T>(items: &[T], liquidity: impl Fn(&T) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, item) in items.iter().enumerate() {
        let liq = liquidity(item);
        match best {
            Some((_, current)) if liq <= current => {}
            _ => best = Some((idx, liq)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Vendors send numbers either as JSON numbers or as decimal strings
pub(crate) mod flex {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let raw = Option::<NumberOrString>::deserialize(deserializer)?;
        let value = match raw {
            Some(NumberOrString::Number(n)) => Some(n),
            Some(NumberOrString::Text(s)) => s.trim().parse::<f64>().ok(),
            None => None,
        };
        Ok(value.filter(|v| v.is_finite()))
    }
}
