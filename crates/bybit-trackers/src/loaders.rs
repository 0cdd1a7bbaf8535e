//! Snapshot loaders: the REST side of reconciliation
//!
//! One loader per resource kind, each producing the tracked state's
//! snapshot form together with its as-of marker. The tracker retries
//! retryable failures with backoff and faults on the rest.

use crate::state::TrackedState;
use crate::user_data::{UserDataSnapshot, UserDataState};
use crate::window::SeriesWindow;
use async_trait::async_trait;
use bybit_rest::{BybitRestClient, RestError};
use bybit_types::{Category, Kline, KlineInterval, Snapshot, Symbol, Trade, UserScope};
use bybit_ws::ReconnectConfig;
use thiserror::Error;
use tracing::warn;

/// A snapshot load failure
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SnapshotError {
    /// What went wrong
    pub message: String,
    /// Whether retrying can help
    pub retryable: bool,
}

impl From<RestError> for SnapshotError {
    fn from(e: RestError) -> Self {
        Self {
            retryable: e.is_retryable(),
            message: e.to_string(),
        }
    }
}

/// Source of point-in-time snapshots for one tracked resource
#[async_trait]
pub trait SnapshotLoad: Send + Sync + 'static {
    /// The state this loader feeds
    type State: TrackedState;

    /// Load a snapshot and its as-of marker (ms since epoch)
    async fn load(
        &self,
    ) -> Result<(<Self::State as TrackedState>::Snapshot, i64), SnapshotError>;
}

/// Retry a load per the given policy; attempts are bounded
pub(crate) async fn load_with_retry<L: SnapshotLoad + ?Sized>(
    loader: &L,
    retry: &ReconnectConfig,
) -> Result<(<L::State as TrackedState>::Snapshot, i64), SnapshotError> {
    let mut attempt: u32 = 0;
    loop {
        match loader.load().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if !e.retryable || !retry.allows_attempt(attempt) {
                    return Err(SnapshotError {
                        message: format!("{e} (after {attempt} attempts)"),
                        retryable: false,
                    });
                }
                let delay = retry.delay(attempt);
                warn!("snapshot load failed ({e}), retrying in {delay:?} (attempt {attempt})");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Loads kline history for one symbol and interval
pub struct KlineLoader {
    client: BybitRestClient,
    category: Category,
    symbol: Symbol,
    interval: KlineInterval,
    limit: u32,
}

impl KlineLoader {
    /// Create a loader; `limit` is the number of buckets to request
    pub fn new(
        client: BybitRestClient,
        category: Category,
        symbol: Symbol,
        interval: KlineInterval,
        limit: u32,
    ) -> Self {
        Self {
            client,
            category,
            symbol,
            interval,
            limit,
        }
    }
}

#[async_trait]
impl SnapshotLoad for KlineLoader {
    type State = SeriesWindow<Kline>;

    async fn load(&self) -> Result<(Vec<Kline>, i64), SnapshotError> {
        let snapshot = self
            .client
            .get_klines(self.category, self.symbol.as_str(), self.interval, self.limit)
            .await?;
        Ok((snapshot.records, snapshot.as_of))
    }
}

/// Loads recent trades for one symbol
pub struct TradeLoader {
    client: BybitRestClient,
    category: Category,
    symbol: Symbol,
    limit: u32,
}

impl TradeLoader {
    /// Create a loader; `limit` is the number of trades to request
    pub fn new(client: BybitRestClient, category: Category, symbol: Symbol, limit: u32) -> Self {
        Self {
            client,
            category,
            symbol,
            limit,
        }
    }
}

#[async_trait]
impl SnapshotLoad for TradeLoader {
    type State = SeriesWindow<Trade>;

    async fn load(&self) -> Result<(Vec<Trade>, i64), SnapshotError> {
        let snapshot = self
            .client
            .get_recent_trades(self.category, self.symbol.as_str(), self.limit)
            .await?;
        Ok((snapshot.records, snapshot.as_of))
    }
}

/// Loads balances, open orders and (futures scope) positions
pub struct UserDataLoader {
    client: BybitRestClient,
    scope: UserScope,
}

impl UserDataLoader {
    /// Create a loader for one account scope
    pub fn new(client: BybitRestClient, scope: UserScope) -> Self {
        Self { client, scope }
    }

    fn order_category(&self) -> Category {
        match self.scope {
            UserScope::Spot => Category::Spot,
            UserScope::Futures => Category::Linear,
        }
    }
}

#[async_trait]
impl SnapshotLoad for UserDataLoader {
    type State = UserDataState;

    async fn load(&self) -> Result<(UserDataSnapshot, i64), SnapshotError> {
        let (balances, orders) = tokio::try_join!(
            self.client.get_wallet_balances(),
            self.client.get_open_orders(self.order_category()),
        )?;
        let positions = match self.scope {
            UserScope::Futures => self.client.get_positions(Category::Linear).await?,
            UserScope::Spot => Snapshot::new(Vec::new(), orders.as_of),
        };

        let snapshot = UserDataSnapshot {
            balances,
            orders,
            positions,
        };
        // The overall marker is the oldest part: everything at or
        // before it is covered by every part of the snapshot.
        let as_of = snapshot.as_of();
        Ok((snapshot, as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyLoader {
        calls: AtomicU32,
        succeed_on: u32,
        retryable: bool,
    }

    #[async_trait]
    impl SnapshotLoad for FlakyLoader {
        type State = SeriesWindow<Kline>;

        async fn load(&self) -> Result<(Vec<Kline>, i64), SnapshotError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok((Vec::new(), 42))
            } else {
                Err(SnapshotError {
                    message: "boom".to_string(),
                    retryable: self.retryable,
                })
            }
        }
    }

    fn fast_retry(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig::default()
            .with_initial_delay(std::time::Duration::from_millis(1))
            .with_max_attempts(max_attempts)
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let loader = FlakyLoader {
            calls: AtomicU32::new(0),
            succeed_on: 3,
            retryable: true,
        };
        let (_, as_of) = load_with_retry(&loader, &fast_retry(5)).await.unwrap();
        assert_eq!(as_of, 42);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhaust() {
        let loader = FlakyLoader {
            calls: AtomicU32::new(0),
            succeed_on: u32::MAX,
            retryable: true,
        };
        let err = load_with_retry(&loader, &fast_retry(2)).await.unwrap_err();
        assert!(err.message.contains("attempts"));
        // Initial call plus two retries
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let loader = FlakyLoader {
            calls: AtomicU32::new(0),
            succeed_on: u32::MAX,
            retryable: false,
        };
        load_with_retry(&loader, &fast_retry(5)).await.unwrap_err();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }
}
