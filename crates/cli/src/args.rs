use clap::{Args, Parser, Subcommand};

use oracle_core::{ChainId, TokenIdentifier};

#[derive(Parser)]
#[command(author, version, about = "Token USD prices and leveraged position PnL")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Current USD price of one token
    Price(PriceArgs),

    /// Prices for several `SYMBOL[:PAIR][@CHAIN]` identifiers
    Prices {
        #[arg(required = true)]
        ids: Vec<TokenIdentifier>,
    },

    /// Quotes from every source with statistics and arbitrage spreads
    Aggregate {
        symbol: String,

        #[arg(long)]
        chain: Option<ChainId>,
    },

    /// Unrealized PnL of a leveraged position at the current price
    Pnl(PnlArgs),

    /// Poll prices until interrupted
    Stream {
        #[arg(required = true)]
        ids: Vec<TokenIdentifier>,

        /// Poll interval (defaults to PRICE_ORACLE__STREAM__INTERVAL_MS)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Internal aggregator health and local cache state
    Health,

    /// Chains the internal aggregator serves
    Chains,
}

#[derive(Args)]
pub struct PriceArgs {
    pub symbol: String,

    /// Price a specific pool instead of the deepest one
    #[arg(long)]
    pub pair: Option<String>,

    #[arg(long)]
    pub chain: Option<ChainId>,
}

#[derive(Args)]
pub struct PnlArgs {
    /// Identifier the current price is looked up by
    pub id: String,

    /// Entry price, e.g. "$45,000.00"
    #[arg(long, allow_hyphen_values = true)]
    pub entry: String,

    /// Margin, e.g. "$1000"
    #[arg(long)]
    pub margin: String,

    /// Leverage, e.g. "10x"
    #[arg(long)]
    pub leverage: String,

    /// Short position (long by default)
    #[arg(long)]
    pub short: bool,

    /// Carried through for display only
    #[arg(long)]
    pub liquidation: Option<String>,
}
