//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::OracleError;

/// Supported blockchain networks
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    #[default]
    Ethereum,
    Bsc,
    Polygon,
    Arbitrum,
    Base,
    Optimism,
    Avalanche,
}

impl ChainId {
    pub const ALL: [ChainId; 7] = [
        ChainId::Ethereum,
        ChainId::Bsc,
        ChainId::Polygon,
        ChainId::Arbitrum,
        ChainId::Base,
        ChainId::Optimism,
        ChainId::Avalanche,
    ];

    pub fn chain_id(&self) -> u64 {
        match self {
            ChainId::Ethereum => 1,
            ChainId::Bsc => 56,
            ChainId::Polygon => 137,
            ChainId::Arbitrum => 42161,
            ChainId::Base => 8453,
            ChainId::Optimism => 10,
            ChainId::Avalanche => 43114,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Bsc => "bsc",
            ChainId::Polygon => "polygon",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Base => "base",
            ChainId::Optimism => "optimism",
            ChainId::Avalanche => "avalanche",
        }
    }

    /// Chain slug used by the DEX index (`chainId` field on pairs)
    pub fn dex_index_slug(&self) -> &'static str {
        self.name()
    }

    /// Network id used by the market-data index pool endpoints
    pub fn market_data_network(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "eth",
            ChainId::Bsc => "bsc",
            ChainId::Polygon => "polygon_pos",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Base => "base",
            ChainId::Optimism => "optimism",
            ChainId::Avalanche => "avax",
        }
    }

    /// Asset platform id used by the market-data simple price endpoint
    pub fn market_data_platform(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Bsc => "binance-smart-chain",
            ChainId::Polygon => "polygon-pos",
            ChainId::Arbitrum => "arbitrum-one",
            ChainId::Base => "base",
            ChainId::Optimism => "optimistic-ethereum",
            ChainId::Avalanche => "avalanche",
        }
    }

    /// Look up a chain by its numeric id
    pub fn from_numeric(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.chain_id() == id)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ChainId {
    type Err = OracleError;

    /// Accepts the canonical name, any vendor slug, or the numeric chain id
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();

        if let Ok(id) = needle.parse::<u64>() {
            return Self::from_numeric(id)
                .ok_or_else(|| OracleError::Validation(format!("Unknown chain id: {id}")));
        }

        let alias = match needle.as_str() {
            "eth" | "mainnet" => Some(ChainId::Ethereum),
            "bnb" | "binance-smart-chain" => Some(ChainId::Bsc),
            "matic" | "polygon_pos" | "polygon-pos" => Some(ChainId::Polygon),
            "arbitrum-one" | "arb" => Some(ChainId::Arbitrum),
            "optimistic-ethereum" | "op" => Some(ChainId::Optimism),
            "avax" => Some(ChainId::Avalanche),
            _ => None,
        };

        alias
            .or_else(|| Self::ALL.into_iter().find(|c| c.name() == needle))
            .ok_or_else(|| OracleError::Validation(format!("Unknown chain: {s}")))
    }
}

/// Trust label attached to a resolved price, by which source produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a leveraged position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn from_is_long(is_long: bool) -> Self {
        if is_long {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }

    /// +1 for longs, -1 for shorts
    pub fn multiplier(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("long"),
            PositionSide::Short => f.write_str("short"),
        }
    }
}
