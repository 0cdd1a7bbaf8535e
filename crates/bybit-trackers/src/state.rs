//! The state abstraction the reconciliation engine drives
//!
//! A tracker owns one [`TrackedState`]: a container that can absorb a
//! REST snapshot and typed stream events, reporting every observable
//! change as a diff. The engine stays generic over the container; all
//! resource-specific logic (identity, staleness, eviction) lives in the
//! container implementations.

use bybit_types::UpdateEvent;

/// Lifecycle phase of a tracker
///
/// `Faulted` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, not yet started
    Uninitialized,
    /// Initial snapshot loading, stream events buffering
    Bootstrapping,
    /// Snapshot merged, stream events applied as they arrive
    Live,
    /// Reconnected under a new generation, re-snapshotting
    Resyncing,
    /// Snapshot retries exhausted or stream permanently gone
    Faulted,
    /// Disposed
    Closed,
}

/// Connectivity status exposed to consumers
///
/// Tracks data freshness rather than socket internals: `Disconnected`
/// means the state is still served but no longer advancing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerStatus {
    /// Waiting for the first snapshot and subscription
    Connecting,
    /// State is current
    Live,
    /// Reconciling after a reconnect; state may be momentarily stale
    Resyncing,
    /// Stream lost; state frozen at its last consistent point
    Disconnected,
    /// Terminal failure
    Faulted,
    /// Disposed
    Closed,
}

/// A container the reconciliation engine can keep consistent
///
/// Implementations must be idempotent under replay: applying an event
/// the state already reflects changes nothing and yields no diff, and
/// out-of-order events older than the current record for their key are
/// discarded inside `apply`.
pub trait TrackedState: Clone + Send + Sync + 'static {
    /// Point-in-time REST-sourced form of this state
    type Snapshot: Send + 'static;
    /// One observable change
    type Diff: Clone + Send + std::fmt::Debug + 'static;

    /// Absorb a snapshot, upserting by record identity
    ///
    /// Never removes records newer than the snapshot; returns the diffs
    /// the merge produced.
    fn merge_snapshot(&mut self, snapshot: Self::Snapshot) -> Vec<Self::Diff>;

    /// Apply one stream event
    ///
    /// Events for other resources and events staler than the current
    /// record for their key yield no diffs.
    fn apply(&mut self, event: &UpdateEvent) -> Vec<Self::Diff>;
}
