//! Token identity: resolved metadata, caller identifiers and address checks

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ChainId, OracleError, OracleResult};

/// Decimals assumed when a source does not report them
pub const DEFAULT_DECIMALS: u8 = 18;

/// Token information resolved from a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub address: String,
    pub chain: ChainId,
    pub decimals: u8,
    pub logo: Option<String>,
}

impl TokenMetadata {
    pub fn new(symbol: &str, name: &str, address: &str, chain: ChainId) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            address: address.to_string(),
            chain,
            decimals: DEFAULT_DECIMALS,
            logo: None,
        }
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn with_logo(mut self, logo: Option<String>) -> Self {
        self.logo = logo;
        self
    }
}

/// Caller-facing token identifier: `SYMBOL[:PAIR_ADDRESS][@CHAIN]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenIdentifier {
    pub symbol: String,
    pub pair_address: Option<String>,
    pub chain: Option<ChainId>,
}

impl TokenIdentifier {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.trim().to_string(),
            pair_address: None,
            chain: None,
        }
    }

    pub fn with_pair(mut self, pair_address: &str) -> Self {
        self.pair_address = Some(pair_address.trim().to_string());
        self
    }

    pub fn with_chain(mut self, chain: ChainId) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Reject empty symbols and malformed pair addresses
    pub fn validate(&self) -> OracleResult<()> {
        if self.symbol.is_empty() {
            return Err(OracleError::Validation("Token symbol must not be empty".into()));
        }
        if let Some(pair) = &self.pair_address {
            validate_address(pair)?;
        }
        Ok(())
    }
}

impl fmt::Display for TokenIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)?;
        if let Some(pair) = &self.pair_address {
            write!(f, ":{pair}")?;
        }
        if let Some(chain) = &self.chain {
            write!(f, "@{chain}")?;
        }
        Ok(())
    }
}

impl FromStr for TokenIdentifier {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, chain) = match s.rsplit_once('@') {
            Some((rest, chain)) => (rest, Some(chain.parse::<ChainId>()?)),
            None => (s, None),
        };

        let (symbol, pair) = match rest.split_once(':') {
            Some((symbol, pair)) => (symbol, Some(pair)),
            None => (rest, None),
        };

        let mut id = TokenIdentifier::new(symbol);
        if let Some(pair) = pair {
            id = id.with_pair(pair);
        }
        if let Some(chain) = chain {
            id = id.with_chain(chain);
        }

        id.validate()?;
        Ok(id)
    }
}

/// Validate an EVM address (`0x` followed by 40 hex digits)
pub fn validate_address(address: &str) -> OracleResult<Address> {
    let trimmed = address.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return Err(OracleError::Validation(format!("Malformed address: {address}")));
    }
    Address::from_str(trimmed)
        .map_err(|_| OracleError::Validation(format!("Malformed address: {address}")))
}

/// Case-insensitive address comparison
pub fn same_address(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
