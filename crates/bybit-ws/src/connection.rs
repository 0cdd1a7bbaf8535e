//! WebSocket connection loop
//!
//! One connection per endpoint. The loop owns the socket, restores every
//! active topic after a reconnect and feeds normalized events into the
//! [`StreamAdapter`], which stamps them with subscription generations.

use crate::adapter::{ControlMsg, StreamAdapter};
use crate::auth::WsCredentials;
use crate::events::StreamStatus;
use crate::reconnect::ReconnectConfig;

use bybit_types::{BybitError, WsMessage, WsRequest};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// WebSocket endpoints of the V5 API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Public spot stream
    Spot,
    /// Public linear (USDT/USDC contracts) stream
    Linear,
    /// Public inverse contracts stream
    Inverse,
    /// Private account stream (requires credentials)
    Private,
    /// Custom URL (testnet, proxies)
    Custom(String),
}

impl Endpoint {
    /// The WebSocket URL for this endpoint
    pub fn url(&self) -> &str {
        match self {
            Self::Spot => "wss://stream.bybit.com/v5/public/spot",
            Self::Linear => "wss://stream.bybit.com/v5/public/linear",
            Self::Inverse => "wss://stream.bybit.com/v5/public/inverse",
            Self::Private => "wss://stream.bybit.com/v5/private",
            Self::Custom(url) => url,
        }
    }

    /// Whether this endpoint requires authentication
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

/// Configuration for one stream connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint to connect to
    pub endpoint: Endpoint,
    /// Reconnection policy
    pub reconnect: ReconnectConfig,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Application-level ping interval (the server drops idle connections)
    pub ping_interval: Duration,
    /// Credentials (required for [`Endpoint::Private`])
    pub credentials: Option<WsCredentials>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Linear,
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            credentials: None,
        }
    }
}

impl ConnectionConfig {
    /// Create a config with default values
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }

    /// Set the reconnection policy
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set credentials for the private endpoint
    pub fn with_credentials(mut self, credentials: WsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Connection loop driving one [`StreamAdapter`]
pub struct BybitConnection {
    config: ConnectionConfig,
    adapter: Arc<StreamAdapter>,
}

impl BybitConnection {
    /// Create a connection for an adapter
    pub fn new(config: ConnectionConfig, adapter: Arc<StreamAdapter>) -> Self {
        Self { config, adapter }
    }

    /// The adapter this connection feeds
    pub fn adapter(&self) -> &Arc<StreamAdapter> {
        &self.adapter
    }

    /// Connect and run until shutdown or (bounded configs) retry exhaustion
    pub async fn run(self) -> Result<(), BybitError> {
        let mut control_rx = self
            .adapter
            .take_control_rx()
            .ok_or(BybitError::ChannelClosed)?;
        let mut shutdown_rx = self.adapter.shutdown_rx();
        let mut attempt: u32 = 0;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.adapter.broadcast_status(StreamStatus::Connecting).await;

            match self
                .run_session(&mut control_rx, &mut shutdown_rx, &mut attempt)
                .await
            {
                Ok(()) => break, // clean shutdown
                Err(e) => {
                    // Events from the dead connection must not be trusted
                    // as contiguous with the next one
                    self.adapter.bump_generations();
                    self.adapter
                        .broadcast_status(StreamStatus::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;

                    attempt += 1;
                    if !self.config.reconnect.allows_attempt(attempt) {
                        error!("Reconnection attempts exhausted after {attempt} tries: {e}");
                        self.adapter.broadcast_status(StreamStatus::Exhausted).await;
                        return Err(e);
                    }

                    let delay = self.config.reconnect.delay(attempt);
                    warn!("Stream disconnected ({e}), reconnecting in {delay:?} (attempt {attempt})");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }
        }

        info!("Stream connection for {} shut down", self.config.endpoint.url());
        Ok(())
    }

    // One socket session: connect, authenticate, restore subscriptions,
    // pump messages until the socket drops or shutdown is requested.
    async fn run_session(
        &self,
        control_rx: &mut mpsc::UnboundedReceiver<ControlMsg>,
        shutdown_rx: &mut tokio::sync::watch::Receiver<bool>,
        attempt: &mut u32,
    ) -> Result<(), BybitError> {
        let url = self.config.endpoint.url();
        info!("Connecting to {url}");

        let connect_result = timeout(self.config.connect_timeout, connect_async(url)).await;
        let (ws_stream, _response) = match connect_result {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                return Err(BybitError::ConnectionFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BybitError::ConnectionTimeout {
                    url: url.to_string(),
                    timeout: self.config.connect_timeout,
                })
            }
        };

        let (mut write, mut read) = ws_stream.split();

        if self.config.endpoint.is_private() {
            let creds = self.config.credentials.as_ref().ok_or_else(|| {
                BybitError::Configuration("private endpoint requires credentials".to_string())
            })?;
            send_request(&mut write, &creds.auth_request()).await?;
        }

        // Restore every active topic on this fresh connection
        let topics = self.adapter.active_topics();
        if !topics.is_empty() {
            send_request(&mut write, &WsRequest::subscribe(topics.clone())).await?;
            for topic in &topics {
                self.adapter.announce_subscribed(topic).await;
            }
            info!("Restored {} subscriptions on {url}", topics.len());
        }

        // Reaching a subscribed session counts as recovery
        *attempt = 0;

        let mut ping_timer = interval(self.config.ping_interval);
        ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping_timer.tick() => {
                    send_request(&mut write, &WsRequest::ping()).await?;
                }
                control = control_rx.recv() => {
                    match control {
                        Some(ControlMsg::Subscribe(topic)) => {
                            send_request(&mut write, &WsRequest::subscribe(vec![topic.clone()])).await?;
                            self.adapter.announce_subscribed(&topic).await;
                        }
                        Some(ControlMsg::Unsubscribe(topic)) => {
                            send_request(&mut write, &WsRequest::unsubscribe(vec![topic])).await?;
                        }
                        None => return Ok(()),
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(BybitError::WebSocket("server closed connection".to_string()));
                        }
                        Some(Err(e)) => {
                            return Err(BybitError::WebSocket(e.to_string()));
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        match WsMessage::parse(text) {
            Ok(WsMessage::Push(push)) => {
                self.adapter.dispatch(&push.topic, push.events).await;
            }
            Ok(WsMessage::Response(resp)) => {
                if resp.success {
                    debug!("{} acknowledged (req_id {:?})", resp.op, resp.req_id);
                } else {
                    warn!(
                        "{} rejected: {}",
                        resp.op,
                        resp.ret_msg.as_deref().unwrap_or("unknown reason")
                    );
                }
            }
            Ok(WsMessage::Pong) => {}
            Ok(WsMessage::Unknown(raw)) => debug!("Unknown message: {raw}"),
            Err(e) => warn!("Failed to parse message: {e} - {text}"),
        }
    }
}

async fn send_request<S>(write: &mut S, request: &WsRequest) -> Result<(), BybitError>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(request).map_err(|e| BybitError::InvalidJson {
        message: e.to_string(),
        raw: None,
    })?;
    debug!("Sending: {json}");
    write
        .send(Message::Text(json))
        .await
        .map_err(|e| BybitError::WebSocket(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        assert_eq!(Endpoint::Linear.url(), "wss://stream.bybit.com/v5/public/linear");
        assert!(Endpoint::Private.is_private());
        assert!(!Endpoint::Spot.is_private());
        let custom = Endpoint::Custom("wss://stream-testnet.bybit.com/v5/public/spot".into());
        assert!(custom.url().contains("testnet"));
    }

    #[test]
    fn test_config_builder() {
        let config = ConnectionConfig::new(Endpoint::Private)
            .with_credentials(WsCredentials::new("k", "s"))
            .with_reconnect(ReconnectConfig::default().with_max_attempts(5));
        assert!(config.credentials.is_some());
        assert_eq!(config.reconnect.max_attempts, Some(5));
    }
}
