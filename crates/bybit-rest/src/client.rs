//! Main REST client implementation

use crate::auth::Credentials;
use crate::error::{RestError, RestResult};
use crate::types::{ApiResponse, KlineResult, ListResult, PagedResult, RestTrade, WalletAccount};
use bybit_types::{Balance, Category, Kline, KlineInterval, Order, Position, Snapshot, Trade};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default signature validity window
const DEFAULT_RECV_WINDOW_MS: u32 = 5_000;

/// Production REST endpoint
pub const MAINNET_URL: &str = "https://api.bybit.com";

/// Testnet REST endpoint
pub const TESTNET_URL: &str = "https://api-testnet.bybit.com";

/// Configuration for [`BybitRestClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL ([`MAINNET_URL`] by default)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Signature validity window in milliseconds
    pub recv_window_ms: u32,
    /// Credentials for private endpoints
    pub credentials: Option<Credentials>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: MAINNET_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
            credentials: None,
        }
    }
}

impl ClientConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the testnet endpoint
    pub fn testnet(mut self) -> Self {
        self.base_url = TESTNET_URL.to_string();
        self
    }

    /// Set credentials for private endpoints
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Bybit V5 REST client
///
/// Provides the snapshot calls trackers bootstrap from: kline history,
/// recent trades, wallet balances, open orders and positions. Cheap to
/// clone; clones share the underlying connection pool, so one client can
/// be shared read-only across many trackers.
///
/// # Example
///
/// ```no_run
/// use bybit_rest::{BybitRestClient, Credentials};
/// use bybit_types::{Category, KlineInterval};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = BybitRestClient::new();
///     let snapshot = client
///         .get_klines(Category::Linear, "BTCUSDT", KlineInterval::Min5, 200)
///         .await?;
///     println!("{} klines as of {}", snapshot.records.len(), snapshot.as_of);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct BybitRestClient {
    http_client: Client,
    base_url: String,
    recv_window_ms: u32,
    credentials: Option<Credentials>,
}

impl BybitRestClient {
    /// Create a new client without authentication
    ///
    /// Only public endpoints will be available.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with credentials
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self::with_config(ClientConfig::default().with_credentials(credentials))
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("bybit-rest/0.1.0")
            .build()
            .expect("Failed to create HTTP client");

        info!("Created Bybit REST client for {}", config.base_url);

        Self {
            http_client,
            base_url: config.base_url,
            recv_window_ms: config.recv_window_ms,
            credentials: config.credentials,
        }
    }

    /// Check if the client has credentials for private endpoints
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    // ========================================================================
    // Public Market Endpoints
    // ========================================================================

    /// Get kline history for a symbol
    ///
    /// Returns up to `limit` buckets (max 1000), oldest first, together
    /// with the server time as the snapshot's as-of marker.
    pub async fn get_klines(
        &self,
        category: Category,
        symbol: &str,
        interval: KlineInterval,
        limit: u32,
    ) -> RestResult<Snapshot<Kline>> {
        let query = format!(
            "category={}&symbol={}&interval={}&limit={}",
            category.as_str(),
            symbol,
            interval,
            limit.min(1000)
        );
        let (result, time): (KlineResult, i64) = self.get_public("/v5/market/kline", &query).await?;
        let interval_ms = interval.duration().as_millis() as i64;
        let klines = result.into_klines(interval_ms, time)?;
        Ok(Snapshot::new(klines, time))
    }

    /// Get recent trades for a symbol
    pub async fn get_recent_trades(
        &self,
        category: Category,
        symbol: &str,
        limit: u32,
    ) -> RestResult<Snapshot<Trade>> {
        let query = format!(
            "category={}&symbol={}&limit={}",
            category.as_str(),
            symbol,
            limit.min(1000)
        );
        let (result, time): (ListResult<RestTrade>, i64) =
            self.get_public("/v5/market/recent-trade", &query).await?;
        let mut trades: Vec<Trade> = result.list.into_iter().map(Trade::from).collect();
        // API returns newest first
        trades.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
        Ok(Snapshot::new(trades, time))
    }

    // ========================================================================
    // Private Account Endpoints
    // ========================================================================

    /// Get wallet balances for the unified account
    ///
    /// Balances are stamped with the server time so stream deltas can be
    /// ordered against them.
    pub async fn get_wallet_balances(&self) -> RestResult<Snapshot<Balance>> {
        let (result, time): (ListResult<WalletAccount>, i64) = self
            .get_private("/v5/account/wallet-balance", "accountType=UNIFIED")
            .await?;
        let balances = result
            .list
            .into_iter()
            .flat_map(|account| account.coin)
            .map(|mut b| {
                b.seq = time;
                b
            })
            .collect();
        Ok(Snapshot::new(balances, time))
    }

    /// Get all open orders for a category, following pagination cursors
    pub async fn get_open_orders(&self, category: Category) -> RestResult<Snapshot<Order>> {
        let base_query = format!("category={}&limit=50", category.as_str());
        self.get_all_pages("/v5/order/realtime", &base_query).await
    }

    /// Get all positions for a derivatives category, following pagination
    /// cursors
    pub async fn get_positions(&self, category: Category) -> RestResult<Snapshot<Position>> {
        let base_query = format!("category={}&settleCoin=USDT&limit=200", category.as_str());
        self.get_all_pages("/v5/position/list", &base_query).await
    }

    // ========================================================================
    // Transport helpers
    // ========================================================================

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> RestResult<(T, i64)> {
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!("GET {}", url);
        let response: ApiResponse<T> = self.http_client.get(&url).send().await?.json().await?;
        response.into_result()
    }

    async fn get_private<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> RestResult<(T, i64)> {
        let creds = self.credentials.as_ref().ok_or(RestError::AuthRequired)?;
        let timestamp = now_ms();
        let signature = creds.sign(timestamp, self.recv_window_ms, query);

        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!("GET {} (signed)", url);
        let response: ApiResponse<T> = self
            .http_client
            .get(&url)
            .header("X-BAPI-API-KEY", &creds.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", self.recv_window_ms.to_string())
            .header("X-BAPI-SIGN", signature)
            .send()
            .await?
            .json()
            .await?;
        response.into_result()
    }

    // Walk a cursor-paginated private endpoint to exhaustion. The as-of
    // marker is the server time of the first page.
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        base_query: &str,
    ) -> RestResult<Snapshot<T>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut as_of = 0;

        loop {
            let query = match &cursor {
                Some(c) => format!("{base_query}&cursor={c}"),
                None => base_query.to_string(),
            };
            let (page, time): (PagedResult<T>, i64) = self.get_private(path, &query).await?;
            if as_of == 0 {
                as_of = time;
            }
            let next = page.next_cursor().map(|c| c.to_string());
            records.extend(page.list);
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(Snapshot::new(records, as_of))
    }
}

impl Default for BybitRestClient {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new().testnet().with_timeout(5);
        assert_eq!(config.base_url, TESTNET_URL);
        assert_eq!(config.timeout_secs, 5);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_client_without_credentials() {
        let client = BybitRestClient::new();
        assert!(!client.has_credentials());
    }
}
