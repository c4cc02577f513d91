//! Price quote, aggregate and resolved price types

use serde::{Deserialize, Serialize};

use crate::{ArbitrageOpportunity, ChainId, Confidence, TokenMetadata};

/// Current unix time in milliseconds
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// A single source's view of a token price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub source: String,
    pub price: f64,
    pub usd_price: Option<f64>,
    pub liquidity: Option<f64>,
    pub volume_24h: Option<f64>,
    pub timestamp_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

impl PriceQuote {
    pub fn new(source: &str, price: f64) -> Self {
        Self {
            source: source.to_string(),
            price,
            usd_price: None,
            liquidity: None,
            volume_24h: None,
            timestamp_ms: now_ms(),
            success: true,
            error: None,
        }
    }

    /// A quote recording that `source` could not produce a price
    pub fn failed(source: &str, error: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            price: 0.0,
            usd_price: None,
            liquidity: None,
            volume_24h: None,
            timestamp_ms: now_ms(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn with_usd_price(mut self, usd: Option<f64>) -> Self {
        self.usd_price = usd;
        self
    }

    pub fn with_liquidity(mut self, liquidity: Option<f64>) -> Self {
        self.liquidity = liquidity;
        self
    }

    pub fn with_volume(mut self, volume: Option<f64>) -> Self {
        self.volume_24h = volume;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// USD price if reported, raw price otherwise
    pub fn effective_price(&self) -> f64 {
        self.usd_price.unwrap_or(self.price)
    }

    /// Successful and carrying a positive, finite price
    pub fn is_usable(&self) -> bool {
        let p = self.effective_price();
        self.success && p.is_finite() && p > 0.0
    }

    pub fn liquidity_or_zero(&self) -> f64 {
        self.liquidity.unwrap_or(0.0)
    }
}

/// Dispersion statistics over successful quotes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceStatistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub variance: f64,
    pub std_dev: f64,
}

impl PriceStatistics {
    /// Spread between max and min relative to min, in percent
    pub fn spread_percent(&self) -> f64 {
        if self.min <= 0.0 {
            return 0.0;
        }
        (self.max - self.min) / self.min * 100.0
    }
}

/// A token's price after combining all source quotes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPrice {
    pub token: TokenMetadata,
    pub quotes: Vec<PriceQuote>,
    pub best: Option<PriceQuote>,
    pub weighted_average: Option<f64>,
    pub statistics: PriceStatistics,
    pub arbitrage: Vec<ArbitrageOpportunity>,
    pub timestamp_ms: u64,
}

impl AggregatedPrice {
    pub fn successful_sources(&self) -> usize {
        self.quotes.iter().filter(|q| q.success).count()
    }
}

/// Resolved price returned by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPriceData {
    pub symbol: String,
    pub name: String,
    pub address: String,
    pub chain: ChainId,
    pub pair_address: Option<String>,
    pub price_usd: f64,
    pub liquidity_usd: Option<f64>,
    pub volume_24h: Option<f64>,
    pub source: String,
    pub confidence: Confidence,
    pub timestamp_ms: u64,
}

impl TokenPriceData {
    pub fn from_quote(
        token: &TokenMetadata,
        pair_address: Option<String>,
        quote: &PriceQuote,
        confidence: Confidence,
    ) -> Self {
        Self {
            symbol: token.symbol.clone(),
            name: token.name.clone(),
            address: token.address.clone(),
            chain: token.chain,
            pair_address,
            price_usd: quote.effective_price(),
            liquidity_usd: quote.liquidity,
            volume_24h: quote.volume_24h,
            source: quote.source.clone(),
            confidence,
            timestamp_ms: now_ms(),
        }
    }
}
