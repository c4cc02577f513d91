//! Cross-source arbitrage spread types

use serde::{Deserialize, Serialize};

/// Minimum spread (percent) worth reporting
pub const MIN_ARBITRAGE_PROFIT_PERCENT: f64 = 0.1;

/// Price gap between two sources quoting the same token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    /// Source quoting the lower price
    pub buy_from: String,
    /// Source quoting the higher price
    pub sell_to: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub profit_percent: f64,
}

impl ArbitrageOpportunity {
    /// Build from two prices in either order. `None` if they are equal or
    /// the lower one is not positive.
    pub fn between(source_a: &str, price_a: f64, source_b: &str, price_b: f64) -> Option<Self> {
        if price_a == price_b {
            return None;
        }

        let ((buy_from, buy_price), (sell_to, sell_price)) = if price_a < price_b {
            ((source_a, price_a), (source_b, price_b))
        } else {
            ((source_b, price_b), (source_a, price_a))
        };

        if buy_price <= 0.0 {
            return None;
        }

        Some(Self {
            buy_from: buy_from.to_string(),
            sell_to: sell_to.to_string(),
            buy_price,
            sell_price,
            profit_percent: (sell_price - buy_price) / buy_price * 100.0,
        })
    }

    pub fn is_significant(&self) -> bool {
        self.profit_percent > MIN_ARBITRAGE_PROFIT_PERCENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_between_orders_buy_and_sell() {
        let opp = ArbitrageOpportunity::between("B", 102.0, "A", 100.0).unwrap();
        assert_eq!(opp.buy_from, "A");
        assert_eq!(opp.sell_to, "B");
        assert!((opp.profit_percent - 2.0).abs() < 1e-9);
        assert!(opp.is_significant());
    }

    #[test]
    fn test_equal_prices_have_no_spread() {
        assert!(ArbitrageOpportunity::between("A", 1.0, "B", 1.0).is_none());
    }

    #[test]
    fn test_tiny_spread_not_significant() {
        let opp = ArbitrageOpportunity::between("A", 100.0, "B", 100.05).unwrap();
        assert!(!opp.is_significant());
    }
}
