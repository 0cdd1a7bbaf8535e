//! Composite private-account state: balances, open orders, positions
//!
//! Each map keeps exactly one current record per key and discards
//! events older than what it already holds, so replaying a buffered
//! overlap after a snapshot merge is harmless. Position pushes on the
//! derivatives stream are partial records and are merged field-wise
//! into the tracked position.

use crate::state::TrackedState;
use bybit_types::{
    Balance, Order, Position, PositionSide, Snapshot, UpdateEvent, UserScope,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Key of a tracked position: symbol + side
pub type PositionKey = (String, PositionSide);

/// REST-sourced form of the private account state
///
/// Each part carries its own as-of marker because it comes from its own
/// endpoint; the merge reconciles each map against its own marker.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDataSnapshot {
    /// Wallet balances
    pub balances: Snapshot<Balance>,
    /// Open orders
    pub orders: Snapshot<Order>,
    /// Positions (empty for spot scope)
    pub positions: Snapshot<Position>,
}

impl UserDataSnapshot {
    /// The oldest of the per-part markers: everything at or before this
    /// point is covered by the snapshot as a whole
    pub fn as_of(&self) -> i64 {
        self.balances
            .as_of
            .min(self.orders.as_of)
            .min(self.positions.as_of)
    }
}

/// One observable change to the account state
#[derive(Debug, Clone, PartialEq)]
pub enum UserDataChange {
    /// A balance changed
    Balance(Balance),
    /// An open order appeared or changed
    OrderUpserted(Order),
    /// A tracked order reached a terminal status
    OrderClosed(Order),
    /// A position appeared or changed
    PositionUpserted(Position),
    /// A tracked position went to zero size
    PositionClosed(Position),
}

/// Private account state for one scope
#[derive(Debug, Clone)]
pub struct UserDataState {
    balances: BTreeMap<String, Balance>,
    orders: BTreeMap<String, Order>,
    positions: BTreeMap<PositionKey, Position>,
    track_positions: bool,
}

impl UserDataState {
    /// Create an empty state for a scope
    pub fn new(scope: UserScope) -> Self {
        Self {
            balances: BTreeMap::new(),
            orders: BTreeMap::new(),
            positions: BTreeMap::new(),
            track_positions: scope == UserScope::Futures,
        }
    }

    /// Balance of one asset
    pub fn balance(&self, asset: &str) -> Option<&Balance> {
        self.balances.get(asset)
    }

    /// All balances, ordered by asset
    pub fn balances(&self) -> impl Iterator<Item = &Balance> {
        self.balances.values()
    }

    /// One open order
    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// All open orders
    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// One position
    pub fn position(&self, symbol: &str, side: PositionSide) -> Option<&Position> {
        self.positions.get(&(symbol.to_string(), side))
    }

    /// All open positions
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    fn apply_balance(&mut self, balance: &Balance) -> Vec<UserDataChange> {
        if let Some(existing) = self.balances.get(&balance.asset) {
            if existing.seq > balance.seq {
                debug!(asset = %balance.asset, "discarding stale balance update");
                return Vec::new();
            }
            if existing == balance {
                return Vec::new();
            }
        }
        self.balances
            .insert(balance.asset.clone(), balance.clone());
        vec![UserDataChange::Balance(balance.clone())]
    }

    fn apply_order(&mut self, order: &Order) -> Vec<UserDataChange> {
        if let Some(existing) = self.orders.get(&order.order_id) {
            if existing.updated_at > order.updated_at {
                debug!(order_id = %order.order_id, "discarding stale order update");
                return Vec::new();
            }
        }
        if order.status.is_open() {
            if self.orders.get(&order.order_id) == Some(order) {
                return Vec::new();
            }
            self.orders.insert(order.order_id.clone(), order.clone());
            vec![UserDataChange::OrderUpserted(order.clone())]
        } else if self.orders.remove(&order.order_id).is_some() {
            vec![UserDataChange::OrderClosed(order.clone())]
        } else {
            Vec::new()
        }
    }

    fn apply_position(
        &mut self,
        update: &bybit_types::PositionUpdate,
    ) -> Vec<UserDataChange> {
        if !self.track_positions {
            return Vec::new();
        }
        let key = update.key();
        let merged = match self.positions.get(&key) {
            Some(existing) => {
                if existing.updated_at > update.updated_at {
                    debug!(symbol = %update.symbol, "discarding stale position update");
                    return Vec::new();
                }
                // Derivatives position pushes carry only changed fields
                let mut merged = existing.clone();
                merged.merge_update(update);
                merged
            }
            None => update.clone().into_position(),
        };
        self.upsert_position(merged)
    }

    fn upsert_position(&mut self, position: Position) -> Vec<UserDataChange> {
        let key = position.key();
        if position.size.is_zero() {
            match self.positions.remove(&key) {
                Some(_) => vec![UserDataChange::PositionClosed(position)],
                None => Vec::new(),
            }
        } else {
            if self.positions.get(&key) == Some(&position) {
                return Vec::new();
            }
            self.positions.insert(key, position.clone());
            vec![UserDataChange::PositionUpserted(position)]
        }
    }
}

impl TrackedState for UserDataState {
    type Snapshot = UserDataSnapshot;
    type Diff = UserDataChange;

    fn merge_snapshot(&mut self, snapshot: UserDataSnapshot) -> Vec<UserDataChange> {
        let mut changes = Vec::new();

        for balance in &snapshot.balances.records {
            changes.extend(self.apply_balance(balance));
        }

        // Orders absent from the snapshot and not updated since it was
        // taken were closed while we were not listening.
        let snapshot_ids: std::collections::BTreeSet<&str> = snapshot
            .orders
            .records
            .iter()
            .map(|o| o.order_id.as_str())
            .collect();
        let gone: Vec<String> = self
            .orders
            .values()
            .filter(|o| {
                !snapshot_ids.contains(o.order_id.as_str())
                    && o.updated_at <= snapshot.orders.as_of
            })
            .map(|o| o.order_id.clone())
            .collect();
        for order_id in gone {
            if let Some(order) = self.orders.remove(&order_id) {
                changes.push(UserDataChange::OrderClosed(order));
            }
        }
        for order in &snapshot.orders.records {
            changes.extend(self.apply_order(order));
        }

        if self.track_positions {
            let snapshot_keys: std::collections::BTreeSet<PositionKey> = snapshot
                .positions
                .records
                .iter()
                .map(Position::key)
                .collect();
            let gone: Vec<PositionKey> = self
                .positions
                .values()
                .filter(|p| {
                    !snapshot_keys.contains(&p.key())
                        && p.updated_at <= snapshot.positions.as_of
                })
                .map(Position::key)
                .collect();
            for key in gone {
                if let Some(position) = self.positions.remove(&key) {
                    changes.push(UserDataChange::PositionClosed(position));
                }
            }
            for position in snapshot.positions.records {
                if let Some(existing) = self.positions.get(&position.key()) {
                    if existing.updated_at > position.updated_at {
                        continue;
                    }
                }
                changes.extend(self.upsert_position(position));
            }
        }

        changes
    }

    fn apply(&mut self, event: &UpdateEvent) -> Vec<UserDataChange> {
        match event {
            UpdateEvent::Balance(b) => self.apply_balance(b),
            UpdateEvent::Order(o) => self.apply_order(o),
            UpdateEvent::Position(p) => self.apply_position(p),
            UpdateEvent::Kline(_) | UpdateEvent::Trade(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bybit_types::{OrderStatus, PositionUpdate, Side};
    use rust_decimal_macros::dec;

    fn balance(asset: &str, amount: rust_decimal::Decimal, seq: i64) -> Balance {
        Balance {
            asset: asset.to_string(),
            wallet_balance: amount,
            available: None,
            seq,
        }
    }

    fn order(id: &str, status: OrderStatus, updated_at: i64) -> Order {
        Order {
            order_id: id.to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            status,
            qty: dec!(1),
            price: Some(dec!(100)),
            filled_qty: None,
            updated_at,
        }
    }

    fn position(symbol: &str, size: rust_decimal::Decimal, updated_at: i64) -> Position {
        Position {
            symbol: symbol.to_string(),
            side: PositionSide::Buy,
            size,
            entry_price: Some(dec!(100)),
            leverage: Some(dec!(10)),
            unrealized_pnl: None,
            liq_price: None,
            updated_at,
        }
    }

    fn empty_snapshot(as_of: i64) -> UserDataSnapshot {
        UserDataSnapshot {
            balances: Snapshot::new(vec![], as_of),
            orders: Snapshot::new(vec![], as_of),
            positions: Snapshot::new(vec![], as_of),
        }
    }

    #[test]
    fn test_out_of_order_balance_discarded() {
        let mut state = UserDataState::new(UserScope::Spot);
        state.apply(&UpdateEvent::Balance(balance("BTC", dec!(5), 5)));
        let changes = state.apply(&UpdateEvent::Balance(balance("BTC", dec!(3), 3)));

        // seq 3 arriving after seq 5 must not regress the balance
        assert!(changes.is_empty());
        assert_eq!(state.balance("BTC").map(|b| b.wallet_balance), Some(dec!(5)));
    }

    #[test]
    fn test_terminal_order_leaves_the_open_set() {
        let mut state = UserDataState::new(UserScope::Spot);
        state.apply(&UpdateEvent::Order(order("o1", OrderStatus::New, 100)));
        assert!(state.order("o1").is_some());

        let changes = state.apply(&UpdateEvent::Order(order("o1", OrderStatus::Filled, 200)));
        assert!(matches!(changes.as_slice(), [UserDataChange::OrderClosed(_)]));
        assert!(state.order("o1").is_none());

        // Terminal event for an unknown order changes nothing
        let changes = state.apply(&UpdateEvent::Order(order("o2", OrderStatus::Cancelled, 300)));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_partial_position_update_merges_fields() {
        let mut state = UserDataState::new(UserScope::Futures);
        let mut snapshot = empty_snapshot(50);
        snapshot.positions = Snapshot::new(vec![position("BTCUSDT", dec!(0.5), 40)], 50);
        state.merge_snapshot(snapshot);

        let update = PositionUpdate {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Buy,
            size: Some(dec!(0.75)),
            entry_price: None,
            leverage: None,
            unrealized_pnl: None,
            liq_price: None,
            updated_at: 100,
        };
        state.apply(&UpdateEvent::Position(update));

        let pos = state.position("BTCUSDT", PositionSide::Buy).unwrap();
        assert_eq!(pos.size, dec!(0.75));
        // Fields absent from the push keep their snapshot values
        assert_eq!(pos.entry_price, Some(dec!(100)));
        assert_eq!(pos.leverage, Some(dec!(10)));
    }

    #[test]
    fn test_zero_size_closes_the_position() {
        let mut state = UserDataState::new(UserScope::Futures);
        let mut snapshot = empty_snapshot(50);
        snapshot.positions = Snapshot::new(vec![position("BTCUSDT", dec!(0.5), 40)], 50);
        state.merge_snapshot(snapshot);

        let update = PositionUpdate {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Buy,
            size: Some(dec!(0)),
            entry_price: None,
            leverage: None,
            unrealized_pnl: None,
            liq_price: None,
            updated_at: 100,
        };
        let changes = state.apply(&UpdateEvent::Position(update));
        assert!(matches!(changes.as_slice(), [UserDataChange::PositionClosed(_)]));
        assert!(state.position("BTCUSDT", PositionSide::Buy).is_none());
    }

    #[test]
    fn test_spot_scope_ignores_positions() {
        let mut state = UserDataState::new(UserScope::Spot);
        let update = PositionUpdate {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Buy,
            size: Some(dec!(1)),
            entry_price: None,
            leverage: None,
            unrealized_pnl: None,
            liq_price: None,
            updated_at: 100,
        };
        assert!(state.apply(&UpdateEvent::Position(update)).is_empty());
        assert_eq!(state.positions().count(), 0);
    }

    #[test]
    fn test_resync_removes_orders_closed_while_away()
    {
        let mut state = UserDataState::new(UserScope::Spot);
        state.apply(&UpdateEvent::Order(order("o1", OrderStatus::New, 100)));
        state.apply(&UpdateEvent::Order(order("o2", OrderStatus::New, 120)));

        // o1 is gone from the snapshot and older than its as-of: it was
        // filled or cancelled during the gap. o2 survives.
        let mut snapshot = empty_snapshot(500);
        snapshot.orders = Snapshot::new(vec![order("o2", OrderStatus::New, 120)], 500);
        let changes = state.merge_snapshot(snapshot);

        assert!(changes
            .iter()
            .any(|c| matches!(c, UserDataChange::OrderClosed(o) if o.order_id == "o1")));
        assert!(state.order("o1").is_none());
        assert!(state.order("o2").is_some());
    }

    #[test]
    fn test_snapshot_does_not_regress_newer_records() {
        let mut state = UserDataState::new(UserScope::Spot);
        state.apply(&UpdateEvent::Balance(balance("BTC", dec!(7), 900)));
        state.apply(&UpdateEvent::Order(order("o1", OrderStatus::PartiallyFilled, 900)));

        // Snapshot taken before those updates
        let mut snapshot = empty_snapshot(800);
        snapshot.balances = Snapshot::new(vec![balance("BTC", dec!(5), 800)], 800);
        snapshot.orders = Snapshot::new(vec![order("o1", OrderStatus::New, 700)], 800);
        state.merge_snapshot(snapshot);

        assert_eq!(state.balance("BTC").map(|b| b.wallet_balance), Some(dec!(7)));
        assert_eq!(state.order("o1").map(|o| o.status), Some(OrderStatus::PartiallyFilled));
    }
}
