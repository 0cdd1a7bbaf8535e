//! Resource keys: the identity of a tracked resource

use crate::symbol::{Category, KlineInterval, Symbol, UserScope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the resource a tracker follows
///
/// Immutable for the lifetime of a tracker. The key determines both the
/// REST snapshot call and the WebSocket topic the tracker subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKey {
    /// Kline series for one symbol and interval
    Kline {
        /// Trading pair
        symbol: Symbol,
        /// Market category
        category: Category,
        /// Bucket interval
        interval: KlineInterval,
    },
    /// Recent trades for one symbol
    Trades {
        /// Trading pair
        symbol: Symbol,
        /// Market category
        category: Category,
    },
    /// Private account state (balances, orders, positions)
    UserData {
        /// Account scope
        scope: UserScope,
        /// Optional identifier when one process tracks several users
        user_id: Option<String>,
    },
}

impl ResourceKey {
    /// Kline key shorthand
    pub fn kline(symbol: impl Into<Symbol>, category: Category, interval: KlineInterval) -> Self {
        Self::Kline {
            symbol: symbol.into(),
            category,
            interval,
        }
    }

    /// Trades key shorthand
    pub fn trades(symbol: impl Into<Symbol>, category: Category) -> Self {
        Self::Trades {
            symbol: symbol.into(),
            category,
        }
    }

    /// User-data key shorthand
    pub fn user_data(scope: UserScope) -> Self {
        Self::UserData {
            scope,
            user_id: None,
        }
    }

    /// The market category this key belongs to, if it is a market resource
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Kline { category, .. } | Self::Trades { category, .. } => Some(*category),
            Self::UserData { .. } => None,
        }
    }

    /// WebSocket topics this resource requires
    ///
    /// Market resources map to exactly one public topic. User-data
    /// resources fan out over the private topics their scope needs.
    pub fn topics(&self) -> Vec<String> {
        match self {
            Self::Kline {
                symbol, interval, ..
            } => vec![format!("kline.{}.{}", interval, symbol)],
            Self::Trades { symbol, .. } => vec![format!("publicTrade.{symbol}")],
            Self::UserData { scope, .. } => match scope {
                UserScope::Spot => vec!["wallet".to_string(), "order".to_string()],
                UserScope::Futures => vec![
                    "wallet".to_string(),
                    "order".to_string(),
                    "position".to_string(),
                ],
            },
        }
    }

    /// Whether this key needs an authenticated stream connection
    pub fn is_private(&self) -> bool {
        matches!(self, Self::UserData { .. })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kline {
                symbol,
                category,
                interval,
            } => write!(f, "kline({symbol}, {category}, {interval})"),
            Self::Trades { symbol, category } => write!(f, "trades({symbol}, {category})"),
            Self::UserData { scope, user_id } => match user_id {
                Some(id) => write!(f, "user-data({scope:?}, {id})"),
                None => write!(f, "user-data({scope:?})"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kline_topic() {
        let key = ResourceKey::kline("BTCUSDT", Category::Linear, KlineInterval::Min5);
        assert_eq!(key.topics(), vec!["kline.5.BTCUSDT"]);
        assert!(!key.is_private());
    }

    #[test]
    fn test_trade_topic() {
        let key = ResourceKey::trades("ETHUSDT", Category::Spot);
        assert_eq!(key.topics(), vec!["publicTrade.ETHUSDT"]);
    }

    #[test]
    fn test_user_data_topics() {
        let spot = ResourceKey::user_data(UserScope::Spot);
        assert_eq!(spot.topics(), vec!["wallet", "order"]);
        assert!(spot.is_private());

        let futures = ResourceKey::user_data(UserScope::Futures);
        assert_eq!(futures.topics(), vec!["wallet", "order", "position"]);
    }
}
