//! Per-source trust weights for the weighted average

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight applied to sources missing from the table
pub const UNKNOWN_SOURCE_WEIGHT: f64 = 0.5;

/// Source name -> weight in (0, 1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceWeights {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl SourceWeights {
    pub fn empty() -> Self {
        Self {
            weights: HashMap::new(),
            default_weight: UNKNOWN_SOURCE_WEIGHT,
        }
    }

    pub fn with_weight(mut self, source: &str, weight: f64) -> Self {
        self.weights.insert(source.to_ascii_lowercase(), weight);
        self
    }

    pub fn with_default_weight(mut self, weight: f64) -> Self {
        self.default_weight = weight;
        self
    }

    /// Case-insensitive lookup, falling back to the default weight
    pub fn weight(&self, source: &str) -> f64 {
        self.weights
            .get(&source.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_weight)
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self::empty()
            // Primary centralized exchanges
            .with_weight("binance", 1.0)
            .with_weight("coinbase", 1.0)
            .with_weight("kraken", 0.95)
            .with_weight("okx", 0.9)
            .with_weight("bybit", 0.9)
            // Minor venues
            .with_weight("kucoin", 0.8)
            .with_weight("gate", 0.7)
            .with_weight("mexc", 0.6)
            // On-chain venues and indexes
            .with_weight("uniswap", 0.85)
            .with_weight("pancakeswap", 0.8)
            .with_weight("internal-aggregator", 1.0)
            .with_weight("dex-index", 0.7)
            .with_weight("market-data", 0.6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_sources() {
        let weights = SourceWeights::default();
        assert_eq!(weights.weight("binance"), 1.0);
        assert_eq!(weights.weight("Binance"), 1.0);
        assert_eq!(weights.weight("some-new-venue"), UNKNOWN_SOURCE_WEIGHT);
    }

    #[test]
    fn test_overrides() {
        let weights = SourceWeights::empty()
            .with_weight("A", 0.2)
            .with_default_weight(0.1);
        assert_eq!(weights.weight("a"), 0.2);
        assert_eq!(weights.weight("b"), 0.1);
    }
}
