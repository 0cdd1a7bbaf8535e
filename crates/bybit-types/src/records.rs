//! Record types held in tracked state
//!
//! Serde attributes follow the V5 WebSocket push field names; the REST crate
//! maps its own response shapes into these records.

use crate::symbol::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Deserializers for timestamps the API sends as either numbers or strings
pub mod ts_ms {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(i64),
        Str(String),
    }

    /// Millisecond timestamp, `1672364262444` or `"1672364262444"`
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        match NumOrStr::deserialize(d)? {
            NumOrStr::Num(n) => Ok(n),
            NumOrStr::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }

    /// Optional variant of [`deserialize`]
    pub fn opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Option::<NumOrStr>::deserialize(d)?
            .map(|v| match v {
                NumOrStr::Num(n) => Ok(n),
                NumOrStr::Str(s) => s.parse().map_err(serde::de::Error::custom),
            })
            .transpose()
    }
}

/// Deserializer for optional decimal fields the API sends as `""` when absent
pub mod opt_decimal {
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer};
    use std::str::FromStr;

    /// `""`, `null` and a missing field all map to `None`
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Decimal>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => Decimal::from_str(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// One candlestick bucket
///
/// Identified by its `start` time. The most recent bucket is mutable until
/// `confirmed` is set; all earlier buckets are immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kline {
    /// Bucket open time (ms since epoch) - the bucket's identity
    #[serde(deserialize_with = "ts_ms::deserialize")]
    pub start: i64,
    /// Bucket close time (ms since epoch)
    #[serde(deserialize_with = "ts_ms::deserialize")]
    pub end: i64,
    /// Open price
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    /// High price
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    /// Low price
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    /// Close price (last price while the bucket is in progress)
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    /// Traded volume in base units
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    /// Traded turnover in quote units
    #[serde(with = "rust_decimal::serde::str")]
    pub turnover: Decimal,
    /// True once the bucket is closed and final
    #[serde(rename = "confirm")]
    pub confirmed: bool,
}

/// One executed public trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange-assigned trade id - the trade's identity
    #[serde(rename = "i")]
    pub id: String,
    /// Execution time (ms since epoch)
    #[serde(rename = "T")]
    pub time: i64,
    /// Trading pair
    #[serde(rename = "s")]
    pub symbol: String,
    /// Taker side
    #[serde(rename = "S")]
    pub side: Side,
    /// Price
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Quantity in base units
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    pub qty: Decimal,
}

/// Balance of one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Asset identifier ("BTC", "USDT", ...) - the balance's key
    #[serde(rename = "coin")]
    pub asset: String,
    /// Total wallet balance
    #[serde(rename = "walletBalance", with = "rust_decimal::serde::str")]
    pub wallet_balance: Decimal,
    /// Balance available for trading/withdrawal
    #[serde(
        rename = "availableToWithdraw",
        deserialize_with = "opt_decimal::deserialize",
        default
    )]
    pub available: Option<Decimal>,
    /// Update marker (ms since epoch), stamped by the tracker from the
    /// enclosing message, not part of the wire shape
    #[serde(default)]
    pub seq: i64,
}

/// Order status of the V5 API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Acknowledged, resting in the book
    New,
    /// Partially filled, still active
    PartiallyFilled,
    /// Completely filled
    Filled,
    /// Canceled by user or system
    Cancelled,
    /// Rejected by the matching engine
    Rejected,
    /// Untriggered conditional order
    Untriggered,
    /// Conditional order triggered
    Triggered,
    /// Conditional order deactivated
    Deactivated,
}

impl OrderStatus {
    /// Check if the order can still change
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::New | Self::PartiallyFilled | Self::Untriggered | Self::Triggered
        )
    }
}

/// One order, keyed by order id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned order id - the order's key
    #[serde(rename = "orderId")]
    pub order_id: String,
    /// Trading pair
    pub symbol: String,
    /// Order side
    pub side: Side,
    /// Current status
    #[serde(rename = "orderStatus")]
    pub status: OrderStatus,
    /// Order quantity
    #[serde(rename = "qty", with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    /// Limit price (empty string for market orders)
    #[serde(rename = "price", deserialize_with = "opt_decimal::deserialize", default)]
    pub price: Option<Decimal>,
    /// Cumulative executed quantity
    #[serde(
        rename = "cumExecQty",
        deserialize_with = "opt_decimal::deserialize",
        default
    )]
    pub filled_qty: Option<Decimal>,
    /// Last update time (ms since epoch) - ordering marker
    #[serde(rename = "updatedTime", deserialize_with = "ts_ms::deserialize")]
    pub updated_at: i64,
}

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    /// Long position
    Buy,
    /// Short position
    Sell,
    /// Flat (one-way mode with no position)
    None,
}

/// One derivatives position, keyed by symbol + side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Trading pair
    pub symbol: String,
    /// Position side
    pub side: PositionSide,
    /// Position size in base units
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    /// Average entry price (`entryPrice` on the stream, `avgPrice` on REST)
    #[serde(
        rename = "entryPrice",
        alias = "avgPrice",
        deserialize_with = "opt_decimal::deserialize",
        default
    )]
    pub entry_price: Option<Decimal>,
    /// Leverage
    #[serde(deserialize_with = "opt_decimal::deserialize", default)]
    pub leverage: Option<Decimal>,
    /// Unrealized profit and loss
    #[serde(
        rename = "unrealisedPnl",
        deserialize_with = "opt_decimal::deserialize",
        default
    )]
    pub unrealized_pnl: Option<Decimal>,
    /// Liquidation price
    #[serde(rename = "liqPrice", deserialize_with = "opt_decimal::deserialize", default)]
    pub liq_price: Option<Decimal>,
    /// Last update time (ms since epoch) - ordering marker
    #[serde(rename = "updatedTime", deserialize_with = "ts_ms::deserialize")]
    pub updated_at: i64,
}

impl Position {
    /// Composite key: symbol + side
    pub fn key(&self) -> (String, PositionSide) {
        (self.symbol.clone(), self.side)
    }

    /// Merge a partial update into this position, field by field
    ///
    /// Position pushes on derivatives streams are deltas, not full
    /// snapshots: absent fields keep their current value.
    pub fn merge_update(&mut self, update: &PositionUpdate) {
        if let Some(size) = update.size {
            self.size = size;
        }
        if update.entry_price.is_some() {
            self.entry_price = update.entry_price;
        }
        if update.leverage.is_some() {
            self.leverage = update.leverage;
        }
        if update.unrealized_pnl.is_some() {
            self.unrealized_pnl = update.unrealized_pnl;
        }
        if update.liq_price.is_some() {
            self.liq_price = update.liq_price;
        }
        self.updated_at = update.updated_at;
    }
}

/// Partial position update from the stream
///
/// Every field other than the key and marker is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// Trading pair
    pub symbol: String,
    /// Position side
    pub side: PositionSide,
    /// New size, if changed
    #[serde(deserialize_with = "opt_decimal::deserialize", default)]
    pub size: Option<Decimal>,
    /// New entry price, if changed
    #[serde(rename = "entryPrice", deserialize_with = "opt_decimal::deserialize", default)]
    pub entry_price: Option<Decimal>,
    /// New leverage, if changed
    #[serde(deserialize_with = "opt_decimal::deserialize", default)]
    pub leverage: Option<Decimal>,
    /// New unrealized PnL, if changed
    #[serde(
        rename = "unrealisedPnl",
        deserialize_with = "opt_decimal::deserialize",
        default
    )]
    pub unrealized_pnl: Option<Decimal>,
    /// New liquidation price, if changed
    #[serde(rename = "liqPrice", deserialize_with = "opt_decimal::deserialize", default)]
    pub liq_price: Option<Decimal>,
    /// Update time (ms since epoch) - ordering marker
    #[serde(rename = "updatedTime", deserialize_with = "ts_ms::deserialize")]
    pub updated_at: i64,
}

impl PositionUpdate {
    /// Composite key: symbol + side
    pub fn key(&self) -> (String, PositionSide) {
        (self.symbol.clone(), self.side)
    }

    /// Promote a partial update to a full record (for keys seen first on
    /// the stream, before any snapshot contains them)
    pub fn into_position(self) -> Position {
        Position {
            symbol: self.symbol,
            side: self.side,
            size: self.size.unwrap_or_default(),
            entry_price: self.entry_price,
            leverage: self.leverage,
            unrealized_pnl: self.unrealized_pnl,
            liq_price: self.liq_price,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_position() -> Position {
        Position {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Buy,
            size: dec!(0.5),
            entry_price: Some(dec!(42000)),
            leverage: Some(dec!(10)),
            unrealized_pnl: Some(dec!(12.5)),
            liq_price: Some(dec!(38000)),
            updated_at: 1_000,
        }
    }

    #[test]
    fn test_position_merge_is_field_wise() {
        let mut pos = sample_position();
        let update = PositionUpdate {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Buy,
            size: Some(dec!(0.75)),
            entry_price: None,
            leverage: None,
            unrealized_pnl: None,
            liq_price: None,
            updated_at: 2_000,
        };

        pos.merge_update(&update);
        assert_eq!(pos.size, dec!(0.75));
        // Untouched fields survive a partial update
        assert_eq!(pos.entry_price, Some(dec!(42000)));
        assert_eq!(pos.leverage, Some(dec!(10)));
        assert_eq!(pos.liq_price, Some(dec!(38000)));
        assert_eq!(pos.updated_at, 2_000);
    }

    #[test]
    fn test_kline_parse() {
        let json = r#"{
            "start": 1672324800000,
            "end": 1672325099999,
            "interval": "5",
            "open": "16649.5",
            "high": "16677",
            "low": "16608",
            "close": "16640",
            "volume": "2.081",
            "turnover": "34666.4005",
            "confirm": false,
            "timestamp": 1672324988882
        }"#;

        let kline: Kline = serde_json::from_str(json).unwrap();
        assert_eq!(kline.start, 1672324800000);
        assert_eq!(kline.close, dec!(16640));
        assert!(!kline.confirmed);
    }

    #[test]
    fn test_trade_parse() {
        let json = r#"{
            "T": 1672304486865,
            "s": "BTCUSDT",
            "S": "Buy",
            "v": "0.001",
            "p": "16578.50",
            "i": "20f43950-d8dd-5b31-9112-a178eb6023af",
            "BT": false
        }"#;

        let trade: Trade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.id, "20f43950-d8dd-5b31-9112-a178eb6023af");
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.price, dec!(16578.50));
    }

    #[test]
    fn test_order_parse_string_timestamp() {
        let json = r#"{
            "orderId": "abc-123",
            "symbol": "ETHUSDT",
            "side": "Sell",
            "orderStatus": "PartiallyFilled",
            "qty": "1.5",
            "price": "1200.00",
            "cumExecQty": "0.5",
            "updatedTime": "1672364262444"
        }"#;

        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.updated_at, 1672364262444);
        assert!(order.status.is_open());
    }
}
