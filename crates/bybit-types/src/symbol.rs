//! Symbols, market categories and kline intervals

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Trading pair symbol (BTCUSDT format, no separator)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// BTCUSDT trading pair
    pub const BTC_USDT: &'static str = "BTCUSDT";
    /// ETHUSDT trading pair
    pub const ETH_USDT: &'static str = "ETHUSDT";
    /// SOLUSDT trading pair
    pub const SOL_USDT: &'static str = "SOLUSDT";

    /// Create a new symbol from a string
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Product category of the V5 API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Spot market
    Spot,
    /// USDT/USDC perpetuals and futures
    Linear,
    /// Inverse (coin-margined) contracts
    Inverse,
}

impl Category {
    /// Returns the category name as used in API requests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Linear => "linear",
            Self::Inverse => "inverse",
        }
    }

    /// Returns true if this is a derivatives category
    pub fn is_derivatives(&self) -> bool {
        matches!(self, Self::Linear | Self::Inverse)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope of a user-data tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserScope {
    /// Spot account: balances and orders
    Spot,
    /// Futures account: balances, orders and positions
    Futures,
}

/// Kline (candlestick) interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KlineInterval {
    /// 1 minute
    #[serde(rename = "1")]
    Min1,
    /// 5 minutes
    #[serde(rename = "5")]
    #[default]
    Min5,
    /// 15 minutes
    #[serde(rename = "15")]
    Min15,
    /// 30 minutes
    #[serde(rename = "30")]
    Min30,
    /// 1 hour
    #[serde(rename = "60")]
    Hour1,
    /// 4 hours
    #[serde(rename = "240")]
    Hour4,
    /// 1 day
    #[serde(rename = "D")]
    Day1,
    /// 1 week
    #[serde(rename = "W")]
    Week1,
    /// 1 month
    #[serde(rename = "M")]
    Month1,
}

impl KlineInterval {
    /// Returns the interval code as used in API requests and topics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Min1 => "1",
            Self::Min5 => "5",
            Self::Min15 => "15",
            Self::Min30 => "30",
            Self::Hour1 => "60",
            Self::Hour4 => "240",
            Self::Day1 => "D",
            Self::Week1 => "W",
            Self::Month1 => "M",
        }
    }

    /// Bucket width as a duration
    ///
    /// Month buckets are approximated as 30 days; the exchange assigns the
    /// actual bucket boundaries, we only use this for window eviction.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Min1 => Duration::from_secs(60),
            Self::Min5 => Duration::from_secs(5 * 60),
            Self::Min15 => Duration::from_secs(15 * 60),
            Self::Min30 => Duration::from_secs(30 * 60),
            Self::Hour1 => Duration::from_secs(60 * 60),
            Self::Hour4 => Duration::from_secs(4 * 60 * 60),
            Self::Day1 => Duration::from_secs(24 * 60 * 60),
            Self::Week1 => Duration::from_secs(7 * 24 * 60 * 60),
            Self::Month1 => Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl FromStr for KlineInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Self::Min1),
            "5" => Ok(Self::Min5),
            "15" => Ok(Self::Min15),
            "30" => Ok(Self::Min30),
            "60" => Ok(Self::Hour1),
            "240" => Ok(Self::Hour4),
            "D" => Ok(Self::Day1),
            "W" => Ok(Self::Week1),
            "M" => Ok(Self::Month1),
            other => Err(format!("unknown kline interval: {other}")),
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl Side {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_roundtrip() {
        for i in [
            KlineInterval::Min1,
            KlineInterval::Hour4,
            KlineInterval::Day1,
            KlineInterval::Month1,
        ] {
            assert_eq!(i.as_str().parse::<KlineInterval>().unwrap(), i);
        }
    }

    #[test]
    fn test_category_str() {
        assert_eq!(Category::Linear.as_str(), "linear");
        assert!(Category::Inverse.is_derivatives());
        assert!(!Category::Spot.is_derivatives());
    }

    #[test]
    fn test_symbol() {
        let s = Symbol::new("BTCUSDT");
        assert_eq!(s.as_str(), "BTCUSDT");
        assert_eq!(s.to_string(), "BTCUSDT");
    }
}
