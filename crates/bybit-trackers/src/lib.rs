//! Self-maintaining trackers over Bybit V5 market and account data
//!
//! A tracker fuses two sources into one consistent, always-current
//! view: a point-in-time REST snapshot and a gappy, reconnecting
//! WebSocket stream. The reconciliation engine buffers stream events
//! while a snapshot is in flight, discards events from untrusted
//! subscription generations, resolves the snapshot/stream overlap by
//! record identity, and resyncs automatically after every reconnect.
//! Consumers read a consistent state copy or follow typed diff batches;
//! they never see a half-merged snapshot or a duplicated record.
//!
//! # Example
//!
//! ```no_run
//! use bybit_trackers::{FactoryConfig, TrackerFactory, WindowBound};
//! use bybit_types::{Category, KlineInterval};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = TrackerFactory::new(FactoryConfig::default());
//!     let tracker = factory.create_kline_tracker(
//!         "BTCUSDT",
//!         Category::Linear,
//!         KlineInterval::Min5,
//!         WindowBound::of_limit(200),
//!     )?;
//!     tracker.start();
//!
//!     let mut changes = tracker.subscribe_changes();
//!     while let Some(batch) = changes.recv().await {
//!         for change in batch {
//!             println!("{change:?}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod factory;
pub mod loaders;
pub mod state;
pub mod tracker;
pub mod user_data;
pub mod window;

// Re-export main types
pub use engine::{EngineAction, EngineCore};
pub use factory::{capabilities, FactoryConfig, TrackerFactory};
pub use loaders::{KlineLoader, SnapshotError, SnapshotLoad, TradeLoader, UserDataLoader};
pub use state::{Phase, TrackedState, TrackerStatus};
pub use tracker::{KlineTracker, Tracker, TrackerConfig, TradeTracker, UserDataTracker};
pub use user_data::{UserDataChange, UserDataSnapshot, UserDataState};
pub use window::{SeriesChange, SeriesRecord, SeriesWindow, WindowBound};
