//! Leveraged position PnL
//!
//! Pure math over (entry, current, margin, leverage, side). Inputs arrive as
//! display strings (`"$45,000.00"`, `"10x"`) and are parsed here; any zero or
//! unparsable value aborts the calculation instead of yielding a zero PnL.

use serde::{Deserialize, Serialize};

use crate::PositionSide;

/// Position parameters as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPnLInput {
    /// Token identifier the current price is looked up by
    pub price_key: String,
    pub entry_price: String,
    pub margin: String,
    pub leverage: String,
    pub is_long: bool,
    /// Carried through to the result, not used in the math
    pub liquidation_price: Option<String>,
}

impl PositionPnLInput {
    pub fn new(price_key: &str, entry_price: &str, margin: &str, leverage: &str, is_long: bool) -> Self {
        Self {
            price_key: price_key.to_string(),
            entry_price: entry_price.to_string(),
            margin: margin.to_string(),
            leverage: leverage.to_string(),
            is_long,
            liquidation_price: None,
        }
    }

    pub fn with_liquidation_price(mut self, price: &str) -> Self {
        self.liquidation_price = Some(price.to_string());
        self
    }
}

/// Unrealized PnL of a position at the current price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionPnLResult {
    pub current_price: f64,
    pub entry_price: f64,
    pub side: PositionSide,
    pub margin: f64,
    pub leverage: f64,
    pub total_exposure: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percentage: f64,
    pub token_amount: f64,
    pub current_value: f64,
    pub liquidation_price: Option<f64>,
}

/// Caller-facing strings for a PnL result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnLDisplay {
    pub current_price: String,
    pub entry_price: String,
    pub unrealized_pnl: String,
    pub unrealized_pnl_percentage: String,
}

impl PositionPnLResult {
    pub fn display(&self) -> PnLDisplay {
        PnLDisplay {
            current_price: format_price(self.current_price),
            entry_price: format_price(self.entry_price),
            unrealized_pnl: format_pnl(self.unrealized_pnl),
            unrealized_pnl_percentage: format_pnl_percentage(self.unrealized_pnl_percentage),
        }
    }
}

/// Parse a currency or leverage formatted number (`"$1,000"`, `"10x"`).
///
/// Returns `None` for empty, unparsable or non-finite input.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_nonzero(raw: &str) -> Option<f64> {
    parse_amount(raw).filter(|v| *v != 0.0)
}

/// Compute unrealized PnL for `input` at `current_price`.
///
/// `None` when entry price, current price, margin or leverage is zero or
/// not a number.
pub fn calculate_position_pnl(input: &PositionPnLInput, current_price: f64) -> Option<PositionPnLResult> {
    let entry_price = parse_nonzero(&input.entry_price)?;
    let margin = parse_nonzero(&input.margin)?;
    let leverage = parse_nonzero(&input.leverage)?;
    if !current_price.is_finite() || current_price == 0.0 {
        return None;
    }

    let side = PositionSide::from_is_long(input.is_long);

    let total_exposure = margin * leverage;
    let token_amount = total_exposure / entry_price;
    let current_value = token_amount * current_price;
    let price_change = current_price - entry_price;
    let unrealized_pnl = (price_change / entry_price) * total_exposure * side.multiplier();
    let unrealized_pnl_percentage = (unrealized_pnl / margin) * 100.0;

    Some(PositionPnLResult {
        current_price,
        entry_price,
        side,
        margin,
        leverage,
        total_exposure,
        unrealized_pnl,
        unrealized_pnl_percentage,
        token_amount,
        current_value,
        liquidation_price: input.liquidation_price.as_deref().and_then(parse_amount),
    })
}

/// 12 decimals below 0.001, 8 below 1, 6 otherwise
pub fn format_price(price: f64) -> String {
    let abs = price.abs();
    if abs < 0.001 {
        format!("{price:.12}")
    } else if abs < 1.0 {
        format!("{price:.8}")
    } else {
        format!("{price:.6}")
    }
}

/// Signed, 6 decimals below 1, 4 below 10, 2 otherwise
pub fn format_pnl(pnl: f64) -> String {
    let abs = pnl.abs();
    let decimals = if abs < 1.0 {
        6
    } else if abs < 10.0 {
        4
    } else {
        2
    };
    format!("{}{abs:.decimals$}", sign(pnl))
}

/// Signed percentage, 4 decimals below 1%, 2 otherwise
pub fn format_pnl_percentage(percentage: f64) -> String {
    let abs = percentage.abs();
    let decimals = if abs < 1.0 { 4 } else { 2 };
    format!("{}{abs:.decimals$}%", sign(percentage))
}

fn sign(value: f64) -> &'static str {
    if value < 0.0 {
        "-"
    } else {
        "+"
    }
}
