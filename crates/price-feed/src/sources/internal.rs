//! Internal multi-exchange aggregator adapter
//!
//! Our own aggregation service. Recognized chains have a dedicated
//! `/price/<chain>` endpoint; everything else goes through `/price` with an
//! explicit `chain` parameter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use oracle_core::{
    ChainId, Confidence, InternalAggregatorConfig, PriceQuote, SourceError, SourceResult,
    TokenMetadata, DEFAULT_DECIMALS,
};

use super::{flex, positive, PriceSource, QuoteRequest};
use crate::client::{RequestExecutor, RequestOptions};

pub const NAME: &str = "internal-aggregator";

const API_KEY_HEADER: &str = "x-api-key";

/// `{ success, data, error }` wrapper used by every endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> SourceResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(SourceError::upstream(
                NAME,
                self.error.unwrap_or_else(|| "response carried no data".to_string()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricePayload {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    price_usd: Option<f64>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    liquidity: Option<f64>,
    #[serde(default, rename = "volume24h", deserialize_with = "flex::opt_f64")]
    volume_24h: Option<f64>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    timestamp: Option<f64>,
    /// Per-exchange breakdown
    #[serde(default)]
    sources: Vec<ExchangePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangePayload {
    exchange: String,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    liquidity: Option<f64>,
    #[serde(default, rename = "volume24h", deserialize_with = "flex::opt_f64")]
    volume_24h: Option<f64>,
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChainPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "chainId")]
    chain_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenInfoPayload {
    symbol: String,
    #[serde(default)]
    name: Option<String>,
    address: String,
    #[serde(default)]
    decimals: Option<u8>,
    #[serde(default)]
    logo: Option<String>,
}

fn default_true() -> bool {
    true
}

/// `GET /health` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub exchanges: Vec<String>,
    #[serde(default, deserialize_with = "flex::opt_f64")]
    pub timestamp: Option<f64>,
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.to_ascii_lowercase().as_str(), "ok" | "healthy" | "up")
    }
}

impl PricePayload {
    fn headline_quote(&self) -> SourceResult<PriceQuote> {
        let usd = positive(self.price_usd);
        let price = usd
            .or_else(|| positive(self.price))
            .ok_or_else(|| SourceError::upstream(NAME, "no positive price in response"))?;

        let mut quote = PriceQuote::new(NAME, positive(self.price).unwrap_or(price))
            .with_usd_price(Some(price))
            .with_liquidity(self.liquidity)
            .with_volume(self.volume_24h);
        if let Some(ts) = self.timestamp.filter(|t| *t > 0.0) {
            quote = quote.with_timestamp(ts as u64);
        }
        Ok(quote)
    }

    fn breakdown(&self) -> impl Iterator<Item = PriceQuote> + '_ {
        self.sources.iter().map(|s| match positive(s.price) {
            Some(price) if s.success => PriceQuote::new(&s.exchange, price)
                .with_liquidity(s.liquidity)
                .with_volume(s.volume_24h),
            _ => PriceQuote::failed(
                &s.exchange,
                s.error.clone().unwrap_or_else(|| "no price".to_string()),
            ),
        })
    }

    /// Headline quote first, then one quote per exchange
    fn all_quotes(&self) -> SourceResult<Vec<PriceQuote>> {
        let mut quotes = vec![self.headline_quote()?];
        quotes.extend(self.breakdown());
        Ok(quotes)
    }
}

/// Adapter for the internal aggregation service
pub struct InternalAggregatorSource {
    executor: Arc<RequestExecutor>,
    config: InternalAggregatorConfig,
}

impl InternalAggregatorSource {
    pub fn new(executor: Arc<RequestExecutor>, config: InternalAggregatorConfig) -> Self {
        Self { executor, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, options: RequestOptions) -> RequestOptions {
        match self.config.api_key() {
            Some(key) => options.header(API_KEY_HEADER, key),
            None => options,
        }
    }

    async fn fetch_price(&self, request: &QuoteRequest) -> SourceResult<PricePayload> {
        let address = request.checked_address()?;

        let (url, options) = if self.config.has_chain_endpoint(request.chain) {
            (
                self.url(&format!("/price/{}", request.chain.name())),
                RequestOptions::get(),
            )
        } else {
            (
                self.url("/price"),
                RequestOptions::get().query("chain", request.chain.name()),
            )
        };

        // Quotes are cached once, by the orchestrator
        let mut options = options
            .no_cache()
            .query("address", address)
            .query("symbol", &request.symbol);
        if let Some(pair) = request.checked_pair()? {
            options = options.query("pair", pair);
        }

        let envelope: Envelope<PricePayload> = self
            .executor
            .request_json(&url, self.authorize(options))
            .await?;
        envelope.into_data()
    }

    /// `POST /prices`: one round trip for many tokens. Entries without a
    /// usable price are left out.
    pub async fn batch_prices(&self, requests: &[QuoteRequest]) -> SourceResult<Vec<(String, PriceQuote)>> {
        let mut tokens = Vec::with_capacity(requests.len());
        for request in requests {
            tokens.push(json!({
                "symbol": request.symbol,
                "address": request.checked_address()?,
                "chain": request.chain.name(),
            }));
        }

        let options = self.authorize(
            RequestOptions::post(json!({ "tokens": tokens }))
                .read_only()
                .no_cache(),
        );
        let envelope: Envelope<Vec<PricePayload>> =
            self.executor.request_json(&self.url("/prices"), options).await?;

        let quotes = envelope
            .into_data()?
            .into_iter()
            .filter_map(|payload| {
                let key = payload.address.clone().or_else(|| payload.symbol.clone())?;
                match payload.headline_quote() {
                    Ok(quote) => Some((key, quote)),
                    Err(e) => {
                        debug!(token = %key, error = %e, "Batch entry without price");
                        None
                    }
                }
            })
            .collect();

        Ok(quotes)
    }

    /// `GET /health`, never cached
    pub async fn health(&self) -> SourceResult<ServiceHealth> {
        let options = self.authorize(RequestOptions::get().no_cache());
        Ok(self.executor.request_json(&self.url("/health"), options).await?)
    }

    /// `GET /oracle`: the service's own aggregate with its exchange breakdown
    pub async fn oracle_reading(&self, symbol: &str, chain: ChainId) -> SourceResult<Vec<PriceQuote>> {
        let options = self.authorize(
            RequestOptions::get()
                .no_cache()
                .query("symbol", symbol)
                .query("chain", chain.name()),
        );
        let envelope: Envelope<PricePayload> =
            self.executor.request_json(&self.url("/oracle"), options).await?;
        envelope.into_data()?.all_quotes()
    }

    /// `GET /chains`; unknown entries are ignored
    pub async fn supported_chains(&self) -> SourceResult<Vec<ChainId>> {
        let options = self.authorize(RequestOptions::get());
        let envelope: Envelope<Vec<ChainPayload>> =
            self.executor.request_json(&self.url("/chains"), options).await?;

        let mut chains = Vec::new();
        for entry in envelope.into_data()? {
            let chain = entry
                .chain_id
                .and_then(ChainId::from_numeric)
                .or_else(|| entry.name.as_deref().and_then(|n| n.parse().ok()));
            if let Some(chain) = chain {
                if !chains.contains(&chain) {
                    chains.push(chain);
                }
            }
        }
        Ok(chains)
    }

    /// `GET /token-info`
    pub async fn token_info(&self, symbol: &str, chain: ChainId) -> SourceResult<Option<TokenMetadata>> {
        let options = self.authorize(
            RequestOptions::get()
                .query("symbol", symbol)
                .query("chain", chain.name()),
        );
        let envelope: Envelope<TokenInfoPayload> = self
            .executor
            .request_json(&self.url("/token-info"), options)
            .await?;

        let Some(info) = envelope.data.filter(|_| envelope.success) else {
            return Ok(None);
        };

        let name = info.name.unwrap_or_else(|| info.symbol.clone());
        Ok(Some(
            TokenMetadata::new(&info.symbol, &name, &info.address, chain)
                .with_decimals(info.decimals.unwrap_or(DEFAULT_DECIMALS))
                .with_logo(info.logo),
        ))
    }
}

#[async_trait]
impl PriceSource for InternalAggregatorSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> SourceResult<PriceQuote> {
        self.fetch_price(request).await?.headline_quote()
    }

    async fn fetch_quotes(&self, request: &QuoteRequest) -> SourceResult<Vec<PriceQuote>> {
        self.fetch_price(request).await?.all_quotes()
    }
}
