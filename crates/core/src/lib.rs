//! Core types and utilities for the token price oracle
//!
//! This crate provides shared types used across all components:
//! - Chain and token identity
//! - Price quotes, aggregated prices and resolved price data
//! - Cross-source arbitrage spreads
//! - Configuration and error taxonomy
//! - Leveraged position PnL math

pub mod types;
pub mod tokens;
pub mod quotes;
pub mod opportunities;
pub mod config;
pub mod errors;
pub mod pnl;

pub use types::*;
pub use tokens::*;
pub use quotes::*;
pub use opportunities::*;
pub use config::*;
pub use errors::*;
pub use pnl::*;
