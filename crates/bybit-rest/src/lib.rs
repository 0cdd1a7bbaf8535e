//! REST snapshot client for the Bybit V5 API
//!
//! This crate provides the REST side of the tracker SDK: the point-in-time
//! snapshot calls trackers bootstrap and resync from. Every call returns a
//! [`bybit_types::Snapshot`] carrying the server time as its as-of marker,
//! which the reconciliation engine uses to resolve snapshot/stream overlap.
//!
//! # Example
//!
//! ```no_run
//! use bybit_rest::BybitRestClient;
//! use bybit_types::{Category, KlineInterval};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BybitRestClient::new();
//!     let trades = client
//!         .get_recent_trades(Category::Linear, "BTCUSDT", 100)
//!         .await?;
//!     println!("{} trades as of {}", trades.records.len(), trades.as_of);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

// Re-export main types
pub use auth::Credentials;
pub use client::{BybitRestClient, ClientConfig, MAINNET_URL, TESTNET_URL};
pub use error::{RestError, RestResult};
