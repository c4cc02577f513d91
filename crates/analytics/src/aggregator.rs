//! Quote aggregator: best price, weighted average, statistics, arbitrage

use std::cmp::Ordering;

use oracle_core::{
    now_ms, AggregatedPrice, ArbitrageOpportunity, PriceQuote, PriceStatistics, TokenMetadata,
    MIN_ARBITRAGE_PROFIT_PERCENT,
};
use tracing::debug;

use crate::SourceWeights;

/// Combines quotes for a single token
#[derive(Debug, Clone)]
pub struct QuoteAggregator {
    weights: SourceWeights,
    /// Adapter names, most trusted first. Breaks liquidity ties.
    priority: Vec<String>,
    min_arbitrage_percent: f64,
}

impl Default for QuoteAggregator {
    fn default() -> Self {
        Self::new(SourceWeights::default(), Vec::new())
    }
}

impl QuoteAggregator {
    pub fn new(weights: SourceWeights, priority: Vec<String>) -> Self {
        Self {
            weights,
            priority: priority.into_iter().map(|s| s.to_ascii_lowercase()).collect(),
            min_arbitrage_percent: MIN_ARBITRAGE_PROFIT_PERCENT,
        }
    }

    pub fn with_min_arbitrage_percent(mut self, percent: f64) -> Self {
        self.min_arbitrage_percent = percent;
        self
    }

    fn priority_rank(&self, source: &str) -> usize {
        let source = source.to_ascii_lowercase();
        self.priority
            .iter()
            .position(|p| *p == source)
            .unwrap_or(usize::MAX)
    }

    /// Highest-liquidity successful quote; ties go to the higher-priority
    /// source, then to the earlier quote.
    pub fn best_price<'a>(&self, quotes: &'a [PriceQuote]) -> Option<&'a PriceQuote> {
        let mut best: Option<&PriceQuote> = None;

        for quote in quotes.iter().filter(|q| q.success) {
            best = match best {
                None => Some(quote),
                Some(current) => {
                    let by_liquidity = quote
                        .liquidity_or_zero()
                        .partial_cmp(&current.liquidity_or_zero())
                        .unwrap_or(Ordering::Equal);

                    let better = match by_liquidity {
                        Ordering::Greater => true,
                        Ordering::Less => false,
                        Ordering::Equal => {
                            self.priority_rank(&quote.source) < self.priority_rank(&current.source)
                        }
                    };

                    if better {
                        Some(quote)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        best
    }

    /// Σ(price × weight) / Σ(weight) over successful, positively priced
    /// quotes. `None` when nothing qualifies.
    pub fn weighted_average(&self, quotes: &[PriceQuote]) -> Option<f64> {
        let (weighted_sum, total_weight) = quotes
            .iter()
            .filter(|q| q.is_usable())
            .fold((0.0, 0.0), |(sum, total), q| {
                let weight = self.weights.weight(&q.source);
                (sum + q.effective_price() * weight, total + weight)
            });

        if total_weight <= 0.0 {
            return None;
        }

        Some(weighted_sum / total_weight)
    }

    /// Every pair of successful quotes whose spread exceeds the threshold,
    /// widest first.
    pub fn arbitrage_opportunities(&self, quotes: &[PriceQuote]) -> Vec<ArbitrageOpportunity> {
        let successful: Vec<&PriceQuote> = quotes.iter().filter(|q| q.is_usable()).collect();
        let mut opportunities = Vec::new();

        for i in 0..successful.len() {
            for j in (i + 1)..successful.len() {
                let a = successful[i];
                let b = successful[j];

                if let Some(opp) = ArbitrageOpportunity::between(
                    &a.source,
                    a.effective_price(),
                    &b.source,
                    b.effective_price(),
                ) {
                    if opp.profit_percent > self.min_arbitrage_percent {
                        opportunities.push(opp);
                    }
                }
            }
        }

        opportunities.sort_by(|a, b| {
            b.profit_percent
                .partial_cmp(&a.profit_percent)
                .unwrap_or(Ordering::Equal)
        });

        opportunities
    }

    /// Build the full aggregate for `token`
    pub fn aggregate(&self, token: TokenMetadata, quotes: Vec<PriceQuote>) -> AggregatedPrice {
        let best = self.best_price(&quotes).cloned();
        let weighted_average = self.weighted_average(&quotes);
        let stats = statistics(&quotes);
        let arbitrage = self.arbitrage_opportunities(&quotes);

        debug!(
            symbol = %token.symbol,
            quotes = quotes.len(),
            successful = stats.count,
            best_source = best.as_ref().map(|q| q.source.as_str()).unwrap_or("none"),
            arbitrage = arbitrage.len(),
            "Aggregated quotes"
        );

        AggregatedPrice {
            token,
            quotes,
            best,
            weighted_average,
            statistics: stats,
            arbitrage,
            timestamp_ms: now_ms(),
        }
    }
}

/// Min, max, mean, median and population variance over successful quotes.
///
/// Returns an all-zero structure when there are none.
pub fn statistics(quotes: &[PriceQuote]) -> PriceStatistics {
    let mut prices: Vec<f64> = quotes
        .iter()
        .filter(|q| q.success)
        .map(|q| q.effective_price())
        .filter(|p| p.is_finite())
        .collect();

    if prices.is_empty() {
        return PriceStatistics::default();
    }

    prices.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let count = prices.len();
    let mean = prices.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (prices[count / 2 - 1] + prices[count / 2]) / 2.0
    } else {
        prices[count / 2]
    };
    let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / count as f64;

    PriceStatistics {
        count,
        min: prices[0],
        max: prices[count - 1],
        mean,
        median,
        variance,
        std_dev: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_core::ChainId;

    fn quote(source: &str, price: f64, liquidity: f64) -> PriceQuote {
        PriceQuote::new(source, price).with_liquidity(Some(liquidity))
    }

    fn token() -> TokenMetadata {
        TokenMetadata::new("WETH", "Wrapped Ether", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", ChainId::Ethereum)
    }

    #[test]
    fn test_best_price_skips_failures() {
        let quotes = vec![
            PriceQuote::failed("A", "timeout"),
            quote("B", 10.0, 5.0),
        ];
        let best = QuoteAggregator::default().best_price(&quotes).unwrap();
        assert_eq!(best.source, "B");
    }

    #[test]
    fn test_best_price_none_without_successes() {
        let quotes = vec![PriceQuote::failed("A", "down"), PriceQuote::failed("B", "down")];
        assert!(QuoteAggregator::default().best_price(&quotes).is_none());
    }

    #[test]
    fn test_best_price_picks_deepest_liquidity() {
        let quotes = vec![quote("A", 100.0, 1_000.0), quote("B", 102.0, 5_000.0)];
        let best = QuoteAggregator::default().best_price(&quotes).unwrap();
        assert_eq!(best.source, "B");
    }

    #[test]
    fn test_liquidity_tie_broken_by_priority() {
        let aggregator = QuoteAggregator::new(
            SourceWeights::default(),
            vec!["internal-aggregator".into(), "dex-index".into()],
        );
        let quotes = vec![
            quote("unlisted", 1.0, 100.0),
            quote("dex-index", 1.1, 100.0),
            quote("internal-aggregator", 1.2, 100.0),
        ];
        assert_eq!(aggregator.best_price(&quotes).unwrap().source, "internal-aggregator");

        // Equal rank keeps the earlier quote
        let quotes = vec![quote("x", 1.0, 0.0), quote("y", 2.0, 0.0)];
        assert_eq!(aggregator.best_price(&quotes).unwrap().source, "x");
    }

    #[test]
    fn test_weighted_average() {
        let weights = SourceWeights::empty().with_weight("a", 1.0).with_weight("b", 0.5);
        let aggregator = QuoteAggregator::new(weights, vec![]);
        let quotes = vec![
            quote("a", 100.0, 0.0),
            quote("b", 130.0, 0.0),
            PriceQuote::failed("a", "nope"),
            quote("b", 0.0, 0.0),
        ];
        // (100*1 + 130*0.5) / 1.5 = 110
        let avg = aggregator.weighted_average(&quotes).unwrap();
        assert!((avg - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_average_unknown_source_default_weight() {
        let aggregator = QuoteAggregator::new(SourceWeights::empty().with_weight("a", 1.0), vec![]);
        let quotes = vec![quote("a", 100.0, 0.0), quote("mystery", 106.0, 0.0)];
        // (100 + 106*0.5) / 1.5 = 102
        assert!((aggregator.weighted_average(&quotes).unwrap() - 102.0).abs() < 1e-9);
        assert!(aggregator.weighted_average(&[]).is_none());
    }

    #[test]
    fn test_statistics_empty_is_all_zero() {
        let stats = statistics(&[PriceQuote::failed("A", "down")]);
        assert_eq!(stats, PriceStatistics::default());
        assert_eq!(stats.count, 0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_statistics_values() {
        let quotes = vec![
            quote("a", 4.0, 0.0),
            quote("b", 2.0, 0.0),
            PriceQuote::failed("c", "down"),
            quote("d", 6.0, 0.0),
            quote("e", 8.0, 0.0),
        ];
        let stats = statistics(&quotes);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 8.0);
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.median, 5.0);
        assert_eq!(stats.variance, 5.0);
        assert!((stats.std_dev - 5.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_arbitrage_between_two_sources() {
        let quotes = vec![quote("A", 100.0, 1_000.0), quote("B", 102.0, 5_000.0)];
        let opps = QuoteAggregator::default().arbitrage_opportunities(&quotes);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].buy_from, "A");
        assert_eq!(opps[0].sell_to, "B");
        assert!((opps[0].profit_percent - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_arbitrage_filters_and_sorts() {
        let quotes = vec![
            quote("A", 100.0, 0.0),
            quote("B", 100.05, 0.0),
            quote("C", 105.0, 0.0),
            PriceQuote::failed("D", "down"),
        ];
        let opps = QuoteAggregator::default().arbitrage_opportunities(&quotes);
        // A/B spread is 0.05%, below the threshold
        assert_eq!(opps.len(), 2);
        assert_eq!(opps[0].buy_from, "A");
        assert_eq!(opps[0].sell_to, "C");
        assert!(opps[0].profit_percent >= opps[1].profit_percent);
    }

    #[test]
    fn test_aggregate_assembles_everything() {
        let quotes = vec![
            quote("A", 100.0, 1_000.0),
            quote("B", 102.0, 5_000.0),
            PriceQuote::failed("C", "down"),
        ];
        let aggregated = QuoteAggregator::default().aggregate(token(), quotes);
        assert_eq!(aggregated.best.as_ref().unwrap().source, "B");
        assert_eq!(aggregated.successful_sources(), 2);
        assert_eq!(aggregated.quotes.len(), 3);
        assert_eq!(aggregated.statistics.count, 2);
        assert_eq!(aggregated.arbitrage.len(), 1);
        assert!(aggregated.weighted_average.is_some());
    }
}
