//! Stream adapter for the Bybit V5 WebSocket API
//!
//! This crate is the streaming half of the tracker SDK. It owns one socket
//! connection per endpoint, multiplexes any number of trackers onto shared
//! reference-counted topic subscriptions, reconnects with bounded jittered
//! backoff, and stamps every delivered event with its topic's subscription
//! generation so downstream consumers can detect reconnects and discard
//! stale in-flight events.
//!
//! # Example
//!
//! ```no_run
//! use bybit_ws::{BybitConnection, ConnectionConfig, Endpoint, StreamAdapter, StreamItem};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = Arc::new(StreamAdapter::new());
//!     let connection = BybitConnection::new(
//!         ConnectionConfig::new(Endpoint::Linear),
//!         Arc::clone(&adapter),
//!     );
//!     tokio::spawn(connection.run());
//!
//!     let mut handle = adapter.subscribe("kline.5.BTCUSDT");
//!     while let Some(item) = handle.recv().await {
//!         match item {
//!             StreamItem::Event(e) => println!("gen {}: {:?}", e.generation, e.event),
//!             StreamItem::Status(s) => println!("status: {s:?}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod auth;
pub mod connection;
pub mod events;
pub mod reconnect;

// Re-export main types
pub use adapter::{StreamAdapter, SubscriptionHandle, DEFAULT_CHANNEL_CAPACITY};
pub use auth::WsCredentials;
pub use connection::{BybitConnection, ConnectionConfig, Endpoint};
pub use events::{StampedEvent, StreamItem, StreamStatus};
pub use reconnect::ReconnectConfig;
