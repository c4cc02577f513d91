//! Multi-source quote aggregation
//!
//! Combines the quotes several sources report for one token into a single
//! view: best (deepest) quote, weighted average, dispersion statistics and
//! cross-source arbitrage spreads.

pub mod aggregator;
pub mod weights;

pub use aggregator::{statistics, QuoteAggregator};
pub use weights::SourceWeights;
