//! Reconciliation core: fuses snapshots and generation-stamped events
//!
//! The core is synchronous and single-writer; the tracker drives it from
//! one task. It buffers events while a snapshot is in flight, discards
//! events from untrusted generations, and resolves the snapshot/stream
//! overlap by replaying only buffered events newer than the snapshot's
//! as-of marker. Everything it decides is returned as an
//! [`EngineAction`] so the async shell stays thin.

use crate::state::{Phase, TrackedState, TrackerStatus};
use bybit_types::ResourceKey;
use bybit_ws::{StampedEvent, StreamItem, StreamStatus};
use tracing::{debug, error, info, warn};

/// What the driving task should do after feeding the core
#[derive(Debug, PartialEq)]
pub enum EngineAction<D> {
    /// Nothing to do
    Idle,
    /// Publish these diffs to change subscribers
    Emit(Vec<D>),
    /// Start (or restart) a snapshot load
    LoadSnapshot,
}

/// Phase machine and event buffer for one tracked resource
pub struct EngineCore<S: TrackedState> {
    resource: ResourceKey,
    state: S,
    phase: Phase,
    status: TrackerStatus,
    trusted_generation: u64,
    buffer: Vec<StampedEvent>,
}

impl<S: TrackedState> EngineCore<S> {
    /// Create a core around an initial (empty) state
    pub fn new(resource: ResourceKey, state: S) -> Self {
        Self {
            resource,
            state,
            phase: Phase::Uninitialized,
            status: TrackerStatus::Connecting,
            trusted_generation: 0,
            buffer: Vec::new(),
        }
    }

    /// The tracked resource
    pub fn resource(&self) -> &ResourceKey {
        &self.resource
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current consumer-facing status
    pub fn status(&self) -> TrackerStatus {
        self.status.clone()
    }

    /// Consistent copy of the current state
    pub fn current(&self) -> S {
        self.state.clone()
    }

    /// Begin bootstrapping; idempotent
    pub fn begin(&mut self) -> EngineAction<S::Diff> {
        if self.phase != Phase::Uninitialized {
            return EngineAction::Idle;
        }
        info!(resource = %self.resource, "bootstrapping");
        self.phase = Phase::Bootstrapping;
        self.status = TrackerStatus::Connecting;
        EngineAction::LoadSnapshot
    }

    /// Feed one stream item through the phase machine
    pub fn handle_item(&mut self, item: StreamItem) -> EngineAction<S::Diff> {
        if matches!(self.phase, Phase::Faulted | Phase::Closed) {
            return EngineAction::Idle;
        }
        match item {
            StreamItem::Event(event) => self.handle_event(event),
            StreamItem::Status(status) => self.handle_status(status),
        }
    }

    fn handle_event(&mut self, event: StampedEvent) -> EngineAction<S::Diff> {
        use std::cmp::Ordering;
        match event.generation.cmp(&self.trusted_generation) {
            Ordering::Less => {
                // In-flight leftover from a connection we no longer trust
                debug!(
                    resource = %self.resource,
                    generation = event.generation,
                    trusted = self.trusted_generation,
                    "discarding event from stale generation"
                );
                EngineAction::Idle
            }
            Ordering::Greater => {
                self.advance_generation(event.generation);
                self.buffer.push(event);
                self.start_resync_if_live()
            }
            Ordering::Equal => match self.phase {
                Phase::Bootstrapping | Phase::Resyncing => {
                    self.buffer.push(event);
                    EngineAction::Idle
                }
                Phase::Live => {
                    let diffs = self.state.apply(&event.event);
                    if diffs.is_empty() {
                        EngineAction::Idle
                    } else {
                        EngineAction::Emit(diffs)
                    }
                }
                _ => EngineAction::Idle,
            },
        }
    }

    fn handle_status(&mut self, status: StreamStatus) -> EngineAction<S::Diff> {
        match status {
            StreamStatus::Connecting => {
                if self.phase == Phase::Bootstrapping {
                    self.status = TrackerStatus::Connecting;
                }
                EngineAction::Idle
            }
            StreamStatus::Subscribed { generation } => {
                if generation > self.trusted_generation {
                    self.advance_generation(generation);
                    self.start_resync_if_live()
                } else {
                    EngineAction::Idle
                }
            }
            StreamStatus::Disconnected { reason } => {
                if self.phase != Phase::Uninitialized {
                    warn!(resource = %self.resource, reason, "stream disconnected");
                    self.status = TrackerStatus::Disconnected;
                }
                EngineAction::Idle
            }
            StreamStatus::Exhausted => {
                error!(resource = %self.resource, "stream reconnection exhausted");
                self.phase = Phase::Faulted;
                self.status = TrackerStatus::Faulted;
                self.buffer.clear();
                EngineAction::Idle
            }
        }
    }

    // Events buffered under an older generation can no longer be trusted
    // as contiguous; only the new generation replays after the snapshot.
    fn advance_generation(&mut self, generation: u64) {
        debug!(
            resource = %self.resource,
            from = self.trusted_generation,
            to = generation,
            "advancing trusted generation"
        );
        self.trusted_generation = generation;
        self.buffer.clear();
    }

    fn start_resync_if_live(&mut self) -> EngineAction<S::Diff> {
        if self.phase == Phase::Live {
            info!(resource = %self.resource, "resyncing after reconnect");
            self.phase = Phase::Resyncing;
            self.status = TrackerStatus::Resyncing;
            EngineAction::LoadSnapshot
        } else {
            // Bootstrapping or already resyncing: the in-flight snapshot
            // is point-in-time truth regardless of which connection is
            // up, so no new load is needed.
            EngineAction::Idle
        }
    }

    /// Merge a loaded snapshot atomically and replay the buffered overlap
    ///
    /// Buffered events at or before the snapshot's as-of marker are
    /// already reflected in it and are discarded; newer ones from the
    /// trusted generation replay in arrival order.
    pub fn complete_snapshot(&mut self, snapshot: S::Snapshot, as_of: i64) -> Vec<S::Diff> {
        if !matches!(self.phase, Phase::Bootstrapping | Phase::Resyncing) {
            return Vec::new();
        }

        let mut diffs = self.state.merge_snapshot(snapshot);
        let buffered = std::mem::take(&mut self.buffer);
        let total = buffered.len();
        let mut replayed = 0usize;
        for event in buffered {
            if event.generation != self.trusted_generation || event.event.marker() <= as_of {
                continue;
            }
            diffs.extend(self.state.apply(&event.event));
            replayed += 1;
        }

        info!(
            resource = %self.resource,
            as_of,
            replayed,
            discarded = total - replayed,
            "snapshot merged, live"
        );
        self.phase = Phase::Live;
        self.status = TrackerStatus::Live;
        diffs
    }

    /// Record a terminal snapshot failure
    pub fn fail_snapshot(&mut self, reason: &str) {
        if matches!(self.phase, Phase::Faulted | Phase::Closed) {
            return;
        }
        error!(resource = %self.resource, reason, "snapshot load failed, faulting");
        self.phase = Phase::Faulted;
        self.status = TrackerStatus::Faulted;
        self.buffer.clear();
    }

    /// Dispose; `Faulted` stays terminal
    pub fn close(&mut self) {
        if matches!(self.phase, Phase::Faulted | Phase::Closed) {
            return;
        }
        self.phase = Phase::Closed;
        self.status = TrackerStatus::Closed;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{SeriesChange, SeriesWindow, WindowBound};
    use bybit_types::{Category, Kline, KlineInterval, UpdateEvent};
    use rust_decimal_macros::dec;

    fn kline(start: i64, close: rust_decimal::Decimal) -> Kline {
        Kline {
            start,
            end: start + 299_999,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            turnover: dec!(1),
            confirmed: false,
        }
    }

    fn stamped(start: i64, close: rust_decimal::Decimal, generation: u64) -> StreamItem {
        StreamItem::Event(StampedEvent {
            event: UpdateEvent::Kline(kline(start, close)),
            generation,
        })
    }

    fn core(limit: usize) -> EngineCore<SeriesWindow<Kline>> {
        EngineCore::new(
            ResourceKey::kline("BTCUSDT", Category::Linear, KlineInterval::Min5),
            SeriesWindow::new(WindowBound::of_limit(limit)),
        )
    }

    #[test]
    fn test_bootstrap_buffers_then_replays_newer_only() {
        let mut core = core(10);
        assert_eq!(core.begin(), EngineAction::LoadSnapshot);
        assert_eq!(core.phase(), Phase::Bootstrapping);

        // Arrive while the snapshot is in flight
        assert_eq!(core.handle_item(stamped(100, dec!(1), 0)), EngineAction::Idle);
        assert_eq!(core.handle_item(stamped(600_000, dec!(9), 0)), EngineAction::Idle);

        // Snapshot covers everything up to 500_000: the bucket-100
        // event (end 300_099) is covered, the bucket-600_000 event
        // (end 899_999) is not and replays.
        let diffs = core.complete_snapshot(vec![kline(100, dec!(2))], 500_000);
        assert_eq!(core.phase(), Phase::Live);
        assert_eq!(core.status(), TrackerStatus::Live);

        let state = core.current();
        assert_eq!(state.get(&100).map(|k| k.close), Some(dec!(2)));
        assert_eq!(state.get(&600_000).map(|k| k.close), Some(dec!(9)));
        assert!(diffs
            .iter()
            .any(|c| matches!(c, SeriesChange::Appended(k) if k.start == 600_000)));
    }

    #[test]
    fn test_live_events_emit_diffs() {
        let mut core = core(10);
        core.begin();
        core.complete_snapshot(vec![], 0);

        match core.handle_item(stamped(100, dec!(1), 0)) {
            EngineAction::Emit(diffs) => assert_eq!(diffs.len(), 1),
            other => panic!("expected Emit, got {other:?}"),
        }
        // Identical revision: state already reflects it
        assert_eq!(core.handle_item(stamped(100, dec!(1), 0)), EngineAction::Idle);
    }

    #[test]
    fn test_stale_generation_discarded() {
        let mut core = core(10);
        core.begin();
        core.complete_snapshot(vec![], 0);
        core.handle_item(StreamItem::Status(StreamStatus::Subscribed { generation: 2 }));

        // Leftover from the dead connection must not touch state
        assert_eq!(core.handle_item(stamped(100, dec!(1), 1)), EngineAction::Idle);
        assert!(core.current().is_empty());
    }

    #[test]
    fn test_newer_generation_triggers_resync_when_live() {
        let mut core = core(10);
        core.begin();
        core.complete_snapshot(vec![kline(100, dec!(1))], 0);
        assert_eq!(core.phase(), Phase::Live);

        let action = core.handle_item(StreamItem::Status(StreamStatus::Subscribed { generation: 1 }));
        assert_eq!(action, EngineAction::LoadSnapshot);
        assert_eq!(core.phase(), Phase::Resyncing);
        assert_eq!(core.status(), TrackerStatus::Resyncing);

        // Old state still served while resyncing
        assert_eq!(core.current().get(&100).map(|k| k.close), Some(dec!(1)));

        // Events under the new generation buffer and replay
        core.handle_item(stamped(600_000, dec!(5), 1));
        core.complete_snapshot(vec![kline(100, dec!(2))], 500_000);
        assert_eq!(core.phase(), Phase::Live);
        let state = core.current();
        assert_eq!(state.get(&100).map(|k| k.close), Some(dec!(2)));
        assert_eq!(state.get(&600_000).map(|k| k.close), Some(dec!(5)));
    }

    #[test]
    fn test_event_from_newer_generation_also_triggers_resync() {
        let mut core = core(10);
        core.begin();
        core.complete_snapshot(vec![], 0);

        // The event itself announces the reconnect before any status does
        let action = core.handle_item(stamped(600_000, dec!(5), 1));
        assert_eq!(action, EngineAction::LoadSnapshot);
        assert_eq!(core.phase(), Phase::Resyncing);

        // It was buffered, not dropped
        let diffs = core.complete_snapshot(vec![], 100);
        assert!(diffs
            .iter()
            .any(|c| matches!(c, SeriesChange::Appended(k) if k.start == 600_000)));
    }

    #[test]
    fn test_reconnect_during_resync_does_not_reload() {
        let mut core = core(10);
        core.begin();
        core.complete_snapshot(vec![], 0);
        assert_eq!(
            core.handle_item(StreamItem::Status(StreamStatus::Subscribed { generation: 1 })),
            EngineAction::LoadSnapshot
        );
        // A second reconnect while the snapshot is still in flight only
        // advances the trusted generation.
        assert_eq!(
            core.handle_item(StreamItem::Status(StreamStatus::Subscribed { generation: 2 })),
            EngineAction::Idle
        );
        assert_eq!(core.phase(), Phase::Resyncing);
    }

    #[test]
    fn test_disconnect_freezes_status_not_state() {
        let mut core = core(10);
        core.begin();
        core.complete_snapshot(vec![kline(100, dec!(1))], 0);

        core.handle_item(StreamItem::Status(StreamStatus::Disconnected {
            reason: "reset".to_string(),
        }));
        assert_eq!(core.status(), TrackerStatus::Disconnected);
        assert_eq!(core.phase(), Phase::Live);
        assert_eq!(core.current().get(&100).map(|k| k.close), Some(dec!(1)));
    }

    #[test]
    fn test_exhausted_faults() {
        let mut core = core(10);
        core.begin();
        core.handle_item(StreamItem::Status(StreamStatus::Exhausted));
        assert_eq!(core.phase(), Phase::Faulted);
        assert_eq!(core.status(), TrackerStatus::Faulted);

        // Terminal: nothing moves it
        core.handle_item(stamped(100, dec!(1), 0));
        assert!(core.current().is_empty());
        core.close();
        assert_eq!(core.phase(), Phase::Faulted);
    }

    #[test]
    fn test_begin_is_idempotent() {
        let mut core = core(10);
        assert_eq!(core.begin(), EngineAction::LoadSnapshot);
        assert_eq!(core.begin(), EngineAction::Idle);
    }

    #[test]
    fn test_snapshot_after_close_is_ignored() {
        let mut core = core(10);
        core.begin();
        core.close();
        let diffs = core.complete_snapshot(vec![kline(100, dec!(1))], 0);
        assert!(diffs.is_empty());
        assert!(core.current().is_empty());
    }
}
