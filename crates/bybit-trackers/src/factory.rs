//! Tracker factory: shared REST client, shared stream connections
//!
//! One factory per credential set. Trackers made by the same factory
//! share one REST connection pool and one WebSocket connection per
//! endpoint; the capability table answers [`can_create`] without
//! touching the network.
//!
//! [`can_create`]: TrackerFactory::can_create

use crate::loaders::{KlineLoader, SnapshotLoad, TradeLoader, UserDataLoader};
use crate::state::TrackedState;
use crate::tracker::{KlineTracker, Tracker, TrackerConfig, TradeTracker, UserDataTracker};
use crate::user_data::UserDataState;
use crate::window::{SeriesWindow, WindowBound};
use bybit_rest::{BybitRestClient, ClientConfig};
use bybit_types::{
    BybitError, BybitResult, Category, KlineInterval, ResourceKey, Symbol, UserScope,
};
use bybit_ws::{
    BybitConnection, ConnectionConfig, Endpoint, ReconnectConfig, StreamAdapter, WsCredentials,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Intervals each category serves on both REST and stream
///
/// The V5 API serves the full interval set on every category; the table
/// is the single place to consult should that change.
pub mod capabilities {
    use super::{Category, KlineInterval};

    /// Intervals supported by a category
    pub fn supported_intervals(_category: Category) -> &'static [KlineInterval] {
        &[
            KlineInterval::Min1,
            KlineInterval::Min5,
            KlineInterval::Min15,
            KlineInterval::Min30,
            KlineInterval::Hour1,
            KlineInterval::Hour4,
            KlineInterval::Day1,
            KlineInterval::Week1,
            KlineInterval::Month1,
        ]
    }

    /// Whether a category serves an interval
    pub fn supports_interval(category: Category, interval: KlineInterval) -> bool {
        supported_intervals(category).contains(&interval)
    }
}

/// Configuration for a [`TrackerFactory`]
#[derive(Debug, Clone, Default)]
pub struct FactoryConfig {
    /// REST client configuration (credentials, testnet, timeouts)
    pub rest: ClientConfig,
    /// Stream reconnection policy, shared by every connection
    pub reconnect: ReconnectConfig,
    /// Per-tracker tuning (snapshot retries, channel capacities)
    pub tracker: TrackerConfig,
    /// Credentials for the private stream
    pub ws_credentials: Option<WsCredentials>,
    /// Use the testnet stream endpoints
    pub testnet: bool,
}

/// Creates trackers sharing one REST client and one stream per endpoint
pub struct TrackerFactory {
    rest: BybitRestClient,
    reconnect: ReconnectConfig,
    tracker_config: TrackerConfig,
    ws_credentials: Option<WsCredentials>,
    testnet: bool,
    adapters: Mutex<HashMap<String, Arc<StreamAdapter>>>,
}

impl TrackerFactory {
    /// Create a factory
    pub fn new(config: FactoryConfig) -> Self {
        Self {
            rest: BybitRestClient::with_config(config.rest),
            reconnect: config.reconnect,
            tracker_config: config.tracker,
            ws_credentials: config.ws_credentials,
            testnet: config.testnet,
            adapters: Mutex::new(HashMap::new()),
        }
    }

    /// Whether this factory can create a tracker for a key
    ///
    /// Resolved from the capability table and the configured
    /// credentials; no network calls.
    pub fn can_create(&self, key: &ResourceKey) -> bool {
        match key {
            ResourceKey::Kline {
                category, interval, ..
            } => capabilities::supports_interval(*category, *interval),
            ResourceKey::Trades { .. } => true,
            ResourceKey::UserData { .. } => {
                self.rest.has_credentials() && self.ws_credentials.is_some()
            }
        }
    }

    /// Create a kline tracker
    ///
    /// The snapshot requests enough history to fill the window's count
    /// limit, capped at the API maximum of 1000 buckets.
    pub fn create_kline_tracker(
        &self,
        symbol: impl Into<Symbol>,
        category: Category,
        interval: KlineInterval,
        bound: WindowBound,
    ) -> BybitResult<KlineTracker> {
        let symbol = symbol.into();
        let key = ResourceKey::kline(symbol.clone(), category, interval);
        self.check_creatable(&key)?;

        let request_limit = bound.limit.unwrap_or(200).min(1000) as u32;
        let loader = Arc::new(KlineLoader::new(
            self.rest.clone(),
            category,
            symbol,
            interval,
            request_limit,
        ));
        self.build(key, SeriesWindow::new(bound), loader)
    }

    /// Create a recent-trades tracker
    pub fn create_trade_tracker(
        &self,
        symbol: impl Into<Symbol>,
        category: Category,
        bound: WindowBound,
    ) -> BybitResult<TradeTracker> {
        let symbol = symbol.into();
        let key = ResourceKey::trades(symbol.clone(), category);
        self.check_creatable(&key)?;

        let request_limit = bound.limit.unwrap_or(200).min(1000) as u32;
        let loader = Arc::new(TradeLoader::new(
            self.rest.clone(),
            category,
            symbol,
            request_limit,
        ));
        self.build(key, SeriesWindow::new(bound), loader)
    }

    /// Create a private account tracker for one scope
    pub fn create_user_data_tracker(&self, scope: UserScope) -> BybitResult<UserDataTracker> {
        let key = ResourceKey::user_data(scope);
        self.check_creatable(&key)?;

        let loader = Arc::new(UserDataLoader::new(self.rest.clone(), scope));
        self.build(key, UserDataState::new(scope), loader)
    }

    fn check_creatable(&self, key: &ResourceKey) -> BybitResult<()> {
        if self.can_create(key) {
            Ok(())
        } else {
            Err(BybitError::UnsupportedResource {
                detail: key.to_string(),
            })
        }
    }

    fn build<S: TrackedState>(
        &self,
        key: ResourceKey,
        initial: S,
        loader: Arc<dyn SnapshotLoad<State = S>>,
    ) -> BybitResult<Tracker<S>> {
        let adapter = self.adapter_for(&key)?;
        let subscriptions = key
            .topics()
            .iter()
            .map(|topic| adapter.subscribe(topic))
            .collect();
        info!(resource = %key, "tracker created");
        Ok(Tracker::new(
            key,
            initial,
            loader,
            subscriptions,
            self.tracker_config.clone(),
        ))
    }

    // One shared connection per endpoint, spawned on first use.
    fn adapter_for(&self, key: &ResourceKey) -> BybitResult<Arc<StreamAdapter>> {
        let endpoint = self.endpoint_for(key)?;
        let mut adapters = self.adapters.lock();
        if let Some(adapter) = adapters.get(endpoint.url()) {
            return Ok(Arc::clone(adapter));
        }

        let adapter = Arc::new(StreamAdapter::new());
        let mut config = ConnectionConfig::new(endpoint.clone())
            .with_reconnect(self.reconnect.clone());
        if key.is_private() {
            let creds = self
                .ws_credentials
                .clone()
                .ok_or_else(|| BybitError::Configuration("missing stream credentials".into()))?;
            config = config.with_credentials(creds);
        }
        tokio::spawn(BybitConnection::new(config, Arc::clone(&adapter)).run());
        adapters.insert(endpoint.url().to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    fn endpoint_for(&self, key: &ResourceKey) -> BybitResult<Endpoint> {
        let endpoint = if key.is_private() {
            Endpoint::Private
        } else {
            match key.category() {
                Some(Category::Spot) => Endpoint::Spot,
                Some(Category::Linear) => Endpoint::Linear,
                Some(Category::Inverse) => Endpoint::Inverse,
                None => {
                    return Err(BybitError::UnsupportedResource {
                        detail: key.to_string(),
                    })
                }
            }
        };
        if !self.testnet {
            return Ok(endpoint);
        }
        let path = match endpoint {
            Endpoint::Spot => "/v5/public/spot",
            Endpoint::Linear => "/v5/public/linear",
            Endpoint::Inverse => "/v5/public/inverse",
            Endpoint::Private => "/v5/private",
            Endpoint::Custom(_) => return Ok(endpoint),
        };
        Ok(Endpoint::Custom(format!(
            "wss://stream-testnet.bybit.com{path}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bybit_rest::Credentials;

    fn public_factory() -> TrackerFactory {
        TrackerFactory::new(FactoryConfig::default())
    }

    #[test]
    fn test_can_create_public_resources() {
        let factory = public_factory();
        assert!(factory.can_create(&ResourceKey::kline(
            "BTCUSDT",
            Category::Linear,
            KlineInterval::Min5
        )));
        assert!(factory.can_create(&ResourceKey::trades("ETHUSDT", Category::Spot)));
    }

    #[test]
    fn test_user_data_requires_credentials() {
        let factory = public_factory();
        let key = ResourceKey::user_data(UserScope::Futures);
        assert!(!factory.can_create(&key));

        let factory = TrackerFactory::new(FactoryConfig {
            rest: ClientConfig::new().with_credentials(Credentials::new("k", "s")),
            ws_credentials: Some(WsCredentials::new("k", "s")),
            ..Default::default()
        });
        assert!(factory.can_create(&key));
    }

    #[tokio::test]
    async fn test_unsupported_resource_is_an_error() {
        let factory = public_factory();
        let err = factory.create_user_data_tracker(UserScope::Spot).unwrap_err();
        assert!(matches!(err, BybitError::UnsupportedResource { .. }));
    }

    #[test]
    fn test_testnet_endpoints() {
        let factory = TrackerFactory::new(FactoryConfig {
            testnet: true,
            ..Default::default()
        });
        let key = ResourceKey::trades("BTCUSDT", Category::Linear);
        let endpoint = factory.endpoint_for(&key).unwrap();
        assert_eq!(
            endpoint.url(),
            "wss://stream-testnet.bybit.com/v5/public/linear"
        );
    }
}
