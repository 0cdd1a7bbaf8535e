//! Shared types for the Bybit V5 tracker SDK
//!
//! This crate provides the core type definitions used across the workspace.
//! It has minimal dependencies and no networking.
//!
//! # Key Types
//!
//! - [`Symbol`], [`Category`], [`KlineInterval`] - market identities
//! - [`ResourceKey`] - identity of a tracked resource
//! - [`Kline`], [`Trade`], [`Balance`], [`Order`], [`Position`] - records
//! - [`UpdateEvent`] - one incremental change from the stream
//! - [`WsMessage`] - parsed WebSocket message envelope
//! - [`BybitError`] - error types

pub mod error;
pub mod events;
pub mod key;
pub mod messages;
pub mod records;
pub mod symbol;

// Re-export commonly used types
pub use error::*;
pub use events::*;
pub use key::*;
pub use messages::*;
pub use records::*;
pub use symbol::*;

// Re-export rust_decimal for users
pub use rust_decimal::Decimal;
