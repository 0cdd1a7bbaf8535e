//! Update events and snapshots: the two inputs the engine reconciles

use crate::records::{Balance, Kline, Order, PositionUpdate, Trade};

/// Point-in-time REST-sourced state used to bootstrap or resync a tracker
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// Records as of `as_of`
    pub records: Vec<T>,
    /// Server timestamp establishing the snapshot's recency (ms since epoch)
    pub as_of: i64,
}

impl<T> Snapshot<T> {
    /// Create a snapshot
    pub fn new(records: Vec<T>, as_of: i64) -> Self {
        Self { records, as_of }
    }
}

/// One typed incremental change delivered by the stream
///
/// Every variant carries its own ordering marker (bucket close time, trade
/// time, update time); [`UpdateEvent::marker`] exposes it uniformly so the
/// reconciliation engine can resolve snapshot/stream overlap.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    /// Kline bucket tick (new bucket or in-progress revision)
    Kline(Kline),
    /// New executed trade
    Trade(Trade),
    /// Balance change for one asset
    Balance(Balance),
    /// Order state change
    Order(Order),
    /// Partial position change
    Position(PositionUpdate),
}

impl UpdateEvent {
    /// Wall-clock ordering marker of this event (ms since epoch)
    ///
    /// Klines use the bucket close time: a bucket still open at some
    /// point in time sorts after it, so buffered revisions of the live
    /// bucket survive a snapshot merge.
    pub fn marker(&self) -> i64 {
        match self {
            Self::Kline(k) => k.end,
            Self::Trade(t) => t.time,
            Self::Balance(b) => b.seq,
            Self::Order(o) => o.updated_at,
            Self::Position(p) => p.updated_at,
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Kline(_) => "kline",
            Self::Trade(_) => "trade",
            Self::Balance(_) => "balance",
            Self::Order(_) => "order",
            Self::Position(_) => "position",
        }
    }
}
