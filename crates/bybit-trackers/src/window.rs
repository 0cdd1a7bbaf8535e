//! Bounded, ordered time-series windows for klines and trades
//!
//! Records are stored by identity (bucket start, trade id), not arrival
//! order: a record arriving twice overwrites in place instead of
//! duplicating, which is what makes snapshot/stream overlap safe to
//! replay.

use crate::state::TrackedState;
use bybit_types::{Kline, Trade, UpdateEvent};
use std::collections::BTreeMap;
use std::time::Duration;

/// A record that can live in a [`SeriesWindow`]
pub trait SeriesRecord: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Identity and ordering key within the series
    type Key: Ord + Clone + Send + Sync + std::fmt::Debug + 'static;

    /// The record's key
    fn key(&self) -> Self::Key;

    /// The record's time (ms since epoch), for period-based eviction
    fn time(&self) -> i64;

    /// Extract this record type from a stream event, if it carries one
    fn from_event(event: &UpdateEvent) -> Option<&Self>;
}

impl SeriesRecord for Kline {
    type Key = i64;

    fn key(&self) -> i64 {
        self.start
    }

    fn time(&self) -> i64 {
        self.start
    }

    fn from_event(event: &UpdateEvent) -> Option<&Self> {
        match event {
            UpdateEvent::Kline(k) => Some(k),
            _ => None,
        }
    }
}

impl SeriesRecord for Trade {
    // Time first so the window orders chronologically; the id breaks
    // ties between trades executed in the same millisecond.
    type Key = (i64, String);

    fn key(&self) -> (i64, String) {
        (self.time, self.id.clone())
    }

    fn time(&self) -> i64 {
        self.time
    }

    fn from_event(event: &UpdateEvent) -> Option<&Self> {
        match event {
            UpdateEvent::Trade(t) => Some(t),
            _ => None,
        }
    }
}

/// Retention bound of a window
///
/// `limit` is a hard cap on record count. `period` is an additional
/// eviction trigger: records older than `newest - period` go even when
/// the window is under its cap. With neither set the window grows
/// unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowBound {
    /// Maximum number of records
    pub limit: Option<usize>,
    /// Maximum record age relative to the newest record
    pub period: Option<Duration>,
}

impl WindowBound {
    /// Bound by record count only
    pub fn of_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            period: None,
        }
    }

    /// Bound by age only
    pub fn of_period(period: Duration) -> Self {
        Self {
            limit: None,
            period: Some(period),
        }
    }

    /// Bound by both count and age
    pub fn new(limit: usize, period: Duration) -> Self {
        Self {
            limit: Some(limit),
            period: Some(period),
        }
    }
}

/// One observable change to a series window
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesChange<R: SeriesRecord> {
    /// A record with a new identity entered the window
    Appended(R),
    /// An existing record was revised in place
    Revised(R),
    /// A record left the window through its retention bound
    Evicted(R::Key),
}

/// Ordered window of series records, bounded by count and/or age
#[derive(Debug, Clone)]
pub struct SeriesWindow<R: SeriesRecord> {
    records: BTreeMap<R::Key, R>,
    bound: WindowBound,
}

impl<R: SeriesRecord> SeriesWindow<R> {
    /// Create an empty window
    pub fn new(bound: WindowBound) -> Self {
        Self {
            records: BTreeMap::new(),
            bound,
        }
    }

    /// Number of records in the window
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record with a given key
    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.records.get(key)
    }

    /// The newest record
    pub fn latest(&self) -> Option<&R> {
        self.records.values().next_back()
    }

    /// Records in chronological order
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.records.values()
    }

    /// Records in chronological order, cloned out
    pub fn records(&self) -> Vec<R> {
        self.records.values().cloned().collect()
    }

    /// Apply one record: append, revise in place, or no-op if identical
    pub fn apply_record(&mut self, record: R) -> Vec<SeriesChange<R>> {
        let mut changes = Vec::new();
        if let Some(change) = self.upsert(record) {
            let appended = matches!(change, SeriesChange::Appended(_));
            changes.push(change);
            if appended {
                changes.extend(self.trim());
            }
        }
        changes
    }

    /// Absorb a batch of records, trimming once at the end
    pub fn merge_records(&mut self, records: Vec<R>) -> Vec<SeriesChange<R>> {
        let mut changes = Vec::new();
        for record in records {
            changes.extend(self.upsert(record));
        }
        changes.extend(self.trim());
        changes
    }

    fn upsert(&mut self, record: R) -> Option<SeriesChange<R>> {
        use std::collections::btree_map::Entry;
        match self.records.entry(record.key()) {
            Entry::Occupied(mut e) => {
                if *e.get() == record {
                    None
                } else {
                    e.insert(record.clone());
                    Some(SeriesChange::Revised(record))
                }
            }
            Entry::Vacant(e) => {
                e.insert(record.clone());
                Some(SeriesChange::Appended(record))
            }
        }
    }

    // Evict oldest-first until the bound holds.
    fn trim(&mut self) -> Vec<SeriesChange<R>> {
        let mut evicted = Vec::new();
        if let Some(limit) = self.bound.limit {
            while self.records.len() > limit {
                if let Some((key, _)) = self.records.pop_first() {
                    evicted.push(SeriesChange::Evicted(key));
                }
            }
        }
        if let Some(period) = self.bound.period {
            if let Some(newest) = self.records.values().next_back().map(R::time) {
                let cutoff = newest - period.as_millis() as i64;
                while let Some(entry) = self.records.first_entry() {
                    if entry.get().time() >= cutoff {
                        break;
                    }
                    let (key, _) = entry.remove_entry();
                    evicted.push(SeriesChange::Evicted(key));
                }
            }
        }
        evicted
    }
}

impl<R: SeriesRecord> TrackedState for SeriesWindow<R> {
    type Snapshot = Vec<R>;
    type Diff = SeriesChange<R>;

    fn merge_snapshot(&mut self, snapshot: Vec<R>) -> Vec<SeriesChange<R>> {
        self.merge_records(snapshot)
    }

    fn apply(&mut self, event: &UpdateEvent) -> Vec<SeriesChange<R>> {
        match R::from_event(event) {
            Some(record) => self.apply_record(record.clone()),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bybit_types::Side;
    use rust_decimal_macros::dec;

    fn kline(start: i64, close: rust_decimal::Decimal, confirmed: bool) -> Kline {
        Kline {
            start,
            end: start + 299_999,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            turnover: dec!(1),
            confirmed,
        }
    }

    fn trade(id: &str, time: i64) -> Trade {
        Trade {
            id: id.to_string(),
            time,
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            price: dec!(100),
            qty: dec!(1),
        }
    }

    #[test]
    fn test_append_and_revise_by_identity() {
        let mut window = SeriesWindow::new(WindowBound::of_limit(10));

        let changes = window.apply_record(kline(100, dec!(1), false));
        assert!(matches!(changes.as_slice(), [SeriesChange::Appended(_)]));

        // Same bucket revised in place, not duplicated
        let changes = window.apply_record(kline(100, dec!(2), false));
        assert!(matches!(changes.as_slice(), [SeriesChange::Revised(_)]));
        assert_eq!(window.len(), 1);
        assert_eq!(window.get(&100).map(|k| k.close), Some(dec!(2)));
    }

    #[test]
    fn test_identical_record_is_a_no_op() {
        let mut window = SeriesWindow::new(WindowBound::of_limit(10));
        window.apply_record(kline(100, dec!(1), true));
        let changes = window.apply_record(kline(100, dec!(1), true));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let mut window = SeriesWindow::new(WindowBound::of_limit(3));
        for start in [100, 200, 300] {
            window.apply_record(kline(start, dec!(1), true));
        }
        assert_eq!(window.len(), 3);

        let changes = window.apply_record(kline(400, dec!(1), false));
        assert_eq!(window.len(), 3);
        assert!(changes.contains(&SeriesChange::Evicted(100)));
        assert!(window.get(&100).is_none());
        assert_eq!(window.latest().map(|k| k.start), Some(400));
    }

    #[test]
    fn test_period_evicts_under_the_cap() {
        let bound = WindowBound::new(100, Duration::from_millis(250));
        let mut window = SeriesWindow::new(bound);
        for start in [100, 200, 300, 400] {
            window.apply_record(kline(start, dec!(1), true));
        }
        // Newest is 400, cutoff 150: bucket 100 is out
        assert_eq!(window.len(), 3);
        assert!(window.get(&100).is_none());
        assert!(window.get(&200).is_some());
    }

    #[test]
    fn test_trade_dedup_by_id() {
        let mut window = SeriesWindow::new(WindowBound::of_limit(10));
        window.apply_record(trade("a", 1_000));
        let changes = window.apply_record(trade("a", 1_000));
        assert!(changes.is_empty());
        assert_eq!(window.len(), 1);

        // Same millisecond, different id: both kept
        window.apply_record(trade("b", 1_000));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_merge_trims_once() {
        let mut window = SeriesWindow::new(WindowBound::of_limit(2));
        let changes = window.merge_records(vec![
            kline(100, dec!(1), true),
            kline(200, dec!(1), true),
            kline(300, dec!(1), false),
        ]);
        assert_eq!(window.len(), 2);
        assert!(changes.contains(&SeriesChange::Evicted(100)));
    }
}
