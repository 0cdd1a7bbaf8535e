//! Items delivered to stream subscribers

use bybit_types::UpdateEvent;

/// Connectivity transitions for a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// Connection attempt in progress
    Connecting,
    /// Topic is subscribed and delivering events for `generation`
    ///
    /// Emitted on every (re)connect. A tracker must not trust the stream
    /// as gap-free across generations: a generation newer than the one it
    /// has been applying means events may have been missed during the
    /// outage and a snapshot resync is required.
    Subscribed {
        /// Current subscription generation of the topic
        generation: u64,
    },
    /// Connection was lost; reconnection is in progress
    Disconnected {
        /// Human-readable reason
        reason: String,
    },
    /// Reconnection attempts were exhausted (bounded configs only)
    Exhausted,
}

/// One update event stamped with its topic's subscription generation
///
/// The generation lets the reconciliation engine distinguish events from
/// before vs. after a reconnect and discard stale in-flight events.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedEvent {
    /// The normalized update
    pub event: UpdateEvent,
    /// Generation of the subscription that delivered it
    pub generation: u64,
}

/// What a subscription handle receives
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A data event
    Event(StampedEvent),
    /// A connectivity transition
    Status(StreamStatus),
}
