//! Token price orchestrator
//!
//! The public entry point. Owns the source fallback order, the short-TTL
//! price cache and chunked batch fetching. "No price" is `Ok(None)`; only
//! malformed caller input is an error.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use oracle_analytics::{QuoteAggregator, SourceWeights};
use oracle_core::{
    calculate_position_pnl, AggregatedPrice, BatchConfig, ChainId, OracleConfig, OracleResult,
    PositionPnLInput, PositionPnLResult, PriceQuote, RequestResult, TokenIdentifier,
    TokenPriceData,
};

use crate::client::{HttpTransport, RequestExecutor};
use crate::resolver::MetadataResolver;
use crate::sources::{
    DexIndexSource, InternalAggregatorSource, MarketDataSource, MetadataSource, PriceSource,
    QuoteRequest,
};
use crate::state::{CacheStore, TtlCache};

/// Cache and source counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStats {
    pub cached_prices: usize,
    pub cached_tokens: usize,
    pub enabled_sources: Vec<&'static str>,
}

/// Outcome of one pass over the fallback chain
enum Lookup {
    Priced(TokenPriceData),
    /// `transient` when at least one source failed on a retryable error
    Unpriced { transient: bool },
}

/// Resolves symbols and prices them through the source fallback chain
pub struct TokenPriceService {
    resolver: Arc<MetadataResolver>,
    sources: Vec<Arc<dyn PriceSource>>,
    cache: Arc<dyn CacheStore<TokenPriceData>>,
    aggregator: QuoteAggregator,
    internal: Option<Arc<InternalAggregatorSource>>,
    default_chain: ChainId,
    batch: BatchConfig,
}

impl TokenPriceService {
    /// `sources` are tried in the given order
    pub fn new(
        resolver: Arc<MetadataResolver>,
        sources: Vec<Arc<dyn PriceSource>>,
        cache: Arc<dyn CacheStore<TokenPriceData>>,
        config: &OracleConfig,
    ) -> Self {
        let priority = sources.iter().map(|s| s.name().to_string()).collect();

        Self {
            resolver,
            sources,
            cache,
            aggregator: QuoteAggregator::new(SourceWeights::default(), priority),
            internal: None,
            default_chain: config.default_chain,
            batch: config.batch.clone(),
        }
    }

    /// Production wiring over reqwest
    pub fn from_config(config: &OracleConfig) -> RequestResult<Self> {
        let executor = RequestExecutor::with_reqwest(config.request.clone())?;
        Ok(Self::assemble(config, Arc::new(executor)))
    }

    /// Production wiring over any transport
    pub fn with_transport(config: &OracleConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(transport, config.request.clone());
        Self::assemble(config, Arc::new(executor))
    }

    fn assemble(config: &OracleConfig, executor: Arc<RequestExecutor>) -> Self {
        let internal = Arc::new(InternalAggregatorSource::new(
            Arc::clone(&executor),
            config.internal.clone(),
        ));
        let dex_index = Arc::new(DexIndexSource::new(
            Arc::clone(&executor),
            config.dex_index.clone(),
        ));
        let market_data = Arc::new(MarketDataSource::new(
            Arc::clone(&executor),
            config.market_data.clone(),
        ));

        let metadata_sources: Vec<Arc<dyn MetadataSource>> =
            vec![dex_index.clone(), market_data.clone()];
        let resolver = Arc::new(MetadataResolver::new(
            metadata_sources,
            config.cache.metadata_ttl(),
        ));

        let price_sources: Vec<Arc<dyn PriceSource>> =
            vec![internal.clone(), dex_index, market_data];
        let cache: Arc<dyn CacheStore<TokenPriceData>> =
            Arc::new(TtlCache::<String, TokenPriceData>::new(config.cache.price_ttl()));

        info!(
            default_chain = %config.default_chain,
            market_data = config.market_data.api_key().is_some(),
            price_ttl_ms = config.cache.price_ttl_ms,
            "Token price service ready"
        );

        let mut service = Self::new(resolver, price_sources, cache, config);
        service.internal = Some(internal);
        service
    }

    /// Internal aggregator, when wired from config
    pub fn internal_aggregator(&self) -> Option<&InternalAggregatorSource> {
        self.internal.as_deref()
    }

    pub fn default_chain(&self) -> ChainId {
        self.default_chain
    }

    fn cache_key(id: &TokenIdentifier, chain: ChainId) -> String {
        format!(
            "{}:{}:{}",
            id.symbol.to_ascii_uppercase(),
            id.pair_address
                .as_deref()
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "-".to_string()),
            chain.name()
        )
    }

    /// Current USD price of `symbol`
    pub async fn get_price(
        &self,
        symbol: &str,
        pair_address: Option<&str>,
        chain: Option<ChainId>,
    ) -> OracleResult<Option<TokenPriceData>> {
        let mut id = TokenIdentifier::new(symbol);
        if let Some(pair) = pair_address {
            id = id.with_pair(pair);
        }
        if let Some(chain) = chain {
            id = id.with_chain(chain);
        }
        self.get_price_for(&id).await
    }

    pub async fn get_price_for(&self, id: &TokenIdentifier) -> OracleResult<Option<TokenPriceData>> {
        Ok(match self.lookup(id).await? {
            Lookup::Priced(data) => Some(data),
            Lookup::Unpriced { .. } => None,
        })
    }

    /// One pass over the cache and the fallback chain
    async fn lookup(&self, id: &TokenIdentifier) -> OracleResult<Lookup> {
        id.validate()?;

        let chain = id.chain.unwrap_or(self.default_chain);
        let key = Self::cache_key(id, chain);

        if let Some(cached) = self.cache.get(&key) {
            debug!(key = %key, "Price cache hit");
            return Ok(Lookup::Priced(cached));
        }

        let Some(token) = self.resolver.resolve(&id.symbol, chain).await else {
            debug!(symbol = %id.symbol, chain = %chain, "Token could not be resolved");
            return Ok(Lookup::Unpriced { transient: false });
        };

        let request = QuoteRequest::for_token(&token, id.pair_address.as_deref());
        let mut transient = false;

        for source in &self.sources {
            if !source.is_enabled() {
                debug!(source = source.name(), "Source not configured, skipping");
                continue;
            }

            match source.fetch_quote(&request).await {
                Ok(quote) if quote.is_usable() => {
                    let data = TokenPriceData::from_quote(
                        &token,
                        id.pair_address.clone(),
                        &quote,
                        source.confidence(),
                    );
                    debug!(
                        key = %key,
                        source = source.name(),
                        price = data.price_usd,
                        confidence = %data.confidence,
                        "Price resolved"
                    );
                    self.cache.set(&key, data.clone());
                    return Ok(Lookup::Priced(data));
                }
                Ok(quote) => {
                    warn!(
                        source = source.name(),
                        symbol = %token.symbol,
                        price = quote.effective_price(),
                        "Unusable price, advancing to next source"
                    );
                }
                Err(e) => {
                    transient |= e.is_transient();
                    warn!(
                        source = source.name(),
                        symbol = %token.symbol,
                        kind = %e.kind(),
                        error = %e,
                        "Source failed, advancing to next source"
                    );
                }
            }
        }

        debug!(symbol = %token.symbol, chain = %chain, transient, "No source produced a price");
        Ok(Lookup::Unpriced { transient })
    }

    /// Prices for many identifiers, keyed by their canonical string form.
    ///
    /// Identifiers without a price are absent from the map. Chunks run
    /// concurrently inside and are separated by the configured delay.
    /// Identifiers whose sources failed transiently get one more attempt
    /// of their own after the chunk; invalid identifiers are skipped.
    pub async fn get_multiple_prices(&self, ids: &[TokenIdentifier]) -> HashMap<String, TokenPriceData> {
        let mut prices = HashMap::with_capacity(ids.len());
        let chunk_size = self.batch.chunk_size.max(1);

        for (index, chunk) in ids.chunks(chunk_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.batch.chunk_delay()).await;
            }

            let results = join_all(chunk.iter().map(|id| self.lookup(id))).await;

            let mut retry = Vec::new();
            for (id, result) in chunk.iter().zip(results) {
                match result {
                    Ok(Lookup::Priced(data)) => {
                        prices.insert(id.to_string(), data);
                    }
                    Ok(Lookup::Unpriced { transient: true }) => retry.push(id),
                    Ok(Lookup::Unpriced { transient: false }) => {}
                    Err(e) => {
                        warn!(id = %id, error = %e, "Skipping invalid identifier");
                    }
                }
            }

            if retry.is_empty() {
                continue;
            }

            warn!(
                chunk = index,
                retrying = retry.len(),
                "Transient source failures in chunk, retrying items one by one"
            );
            for id in retry {
                match self.get_price_for(id).await {
                    Ok(Some(data)) => {
                        prices.insert(id.to_string(), data);
                    }
                    _ => debug!(id = %id, "Still no price after retry"),
                }
            }
        }

        prices
    }

    /// Quotes from every enabled source combined into one aggregate.
    ///
    /// `None` when the symbol cannot be resolved.
    pub async fn get_aggregated_price(
        &self,
        symbol: &str,
        chain: Option<ChainId>,
    ) -> OracleResult<Option<AggregatedPrice>> {
        let id = TokenIdentifier::new(symbol);
        id.validate()?;

        let chain = chain.unwrap_or(self.default_chain);
        let Some(token) = self.resolver.resolve(&id.symbol, chain).await else {
            return Ok(None);
        };

        let request = QuoteRequest::for_token(&token, None);
        let enabled: Vec<&Arc<dyn PriceSource>> =
            self.sources.iter().filter(|s| s.is_enabled()).collect();

        let results = join_all(enabled.iter().map(|s| s.fetch_quotes(&request))).await;

        let mut quotes = Vec::new();
        for (source, result) in enabled.iter().zip(results) {
            match result {
                Ok(mut source_quotes) => quotes.append(&mut source_quotes),
                Err(e) => {
                    debug!(source = source.name(), error = %e, "Source failed during aggregation");
                    quotes.push(PriceQuote::failed(source.name(), e.to_string()));
                }
            }
        }

        Ok(Some(self.aggregator.aggregate(token, quotes)))
    }

    /// Unrealized PnL at the current price of `input.price_key`.
    ///
    /// `None` when no price is available or the inputs are degenerate.
    pub async fn calculate_position_pnl(
        &self,
        input: &PositionPnLInput,
    ) -> OracleResult<Option<PositionPnLResult>> {
        let id: TokenIdentifier = input.price_key.parse()?;

        let Some(price) = self.get_price_for(&id).await? else {
            return Ok(None);
        };

        Ok(calculate_position_pnl(input, price.price_usd))
    }

    /// Drop cached prices and resolved metadata
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.resolver.clear_cache();
    }

    /// Number of cached prices
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cached_prices: self.cache.len(),
            cached_tokens: self.resolver.cache_size(),
            enabled_sources: self
                .sources
                .iter()
                .filter(|s| s.is_enabled())
                .map(|s| s.name())
                .collect(),
        }
    }
}
