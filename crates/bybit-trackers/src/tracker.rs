//! Tracker facade: one resource, one background driver task
//!
//! The driver is the single writer of the engine core. It merges the
//! resource's topic subscriptions into one ordered feed, runs snapshot
//! loads concurrently with event buffering, and publishes diff batches
//! to change subscribers over bounded channels. Queries read the core
//! under a short lock; consumers never see a half-merged snapshot.

use crate::engine::{EngineAction, EngineCore};
use crate::loaders::{load_with_retry, SnapshotLoad};
use crate::state::{TrackedState, TrackerStatus};
use crate::user_data::UserDataState;
use crate::window::SeriesWindow;
use bybit_types::{Kline, ResourceKey, Trade};
use bybit_ws::{ReconnectConfig, StreamItem, SubscriptionHandle};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Tracker of a kline series
pub type KlineTracker = Tracker<SeriesWindow<Kline>>;

/// Tracker of a recent-trades series
pub type TradeTracker = Tracker<SeriesWindow<Trade>>;

/// Tracker of private account state
pub type UserDataTracker = Tracker<UserDataState>;

/// Per-tracker tuning knobs
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Retry policy for snapshot loads; exhaustion faults the tracker
    pub snapshot_retry: ReconnectConfig,
    /// Capacity of each change-subscriber channel
    pub change_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            snapshot_retry: ReconnectConfig::default()
                .with_initial_delay(Duration::from_millis(500))
                .with_max_attempts(5),
            change_capacity: 64,
        }
    }
}

// Everything consumed when the driver launches.
struct Launch<S: TrackedState> {
    loader: Arc<dyn SnapshotLoad<State = S>>,
    subscriptions: Vec<SubscriptionHandle>,
    retry: ReconnectConfig,
}

struct Inner<S: TrackedState> {
    core: RwLock<EngineCore<S>>,
    change_subs: Mutex<Vec<mpsc::Sender<Vec<S::Diff>>>>,
    change_capacity: usize,
    cancel: watch::Sender<bool>,
    launch: Mutex<Option<Launch<S>>>,
}

/// Live view of one tracked resource
///
/// Created by the factory; [`start`](Tracker::start) launches the
/// background reconciliation, and dropping the tracker (or calling
/// [`dispose`](Tracker::dispose)) releases its topic subscriptions.
pub struct Tracker<S: TrackedState> {
    inner: Arc<Inner<S>>,
}

impl<S: TrackedState> std::fmt::Debug for Tracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker").finish_non_exhaustive()
    }
}

impl<S: TrackedState> Tracker<S> {
    /// Create a tracker; normally done through the factory
    pub fn new(
        resource: ResourceKey,
        initial: S,
        loader: Arc<dyn SnapshotLoad<State = S>>,
        subscriptions: Vec<SubscriptionHandle>,
        config: TrackerConfig,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                core: RwLock::new(EngineCore::new(resource, initial)),
                change_subs: Mutex::new(Vec::new()),
                change_capacity: config.change_capacity,
                cancel,
                launch: Mutex::new(Some(Launch {
                    loader,
                    subscriptions,
                    retry: config.snapshot_retry,
                })),
            }),
        }
    }

    /// The tracked resource
    pub fn resource(&self) -> ResourceKey {
        self.inner.core.read().resource().clone()
    }

    /// Start reconciliation; idempotent
    ///
    /// The first call spawns the driver; later calls do nothing.
    pub fn start(&self) {
        let Some(launch) = self.inner.launch.lock().take() else {
            return;
        };

        // Merge all topic feeds into one ordered channel; each
        // forwarder owns its subscription handle and drops it (thereby
        // unsubscribing) on cancellation.
        let (merged_tx, merged_rx) = mpsc::channel(bybit_ws::DEFAULT_CHANNEL_CAPACITY);
        for mut handle in launch.subscriptions {
            let tx = merged_tx.clone();
            let mut cancel_rx = self.inner.cancel.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel_rx.changed() => break,
                        item = handle.recv() => match item {
                            Some(item) => {
                                if tx.send(item).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
                debug!(topic = handle.topic(), "feed forwarder stopped");
            });
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(drive(inner, launch.loader, merged_rx, launch.retry));
    }

    /// Consistent copy of the current state
    pub fn current(&self) -> S {
        self.inner.core.read().current()
    }

    /// Current connectivity status
    pub fn status(&self) -> TrackerStatus {
        self.inner.core.read().status()
    }

    /// Subscribe to diff batches
    ///
    /// The channel is bounded by the configured capacity; a consumer
    /// falling behind back-pressures the tracker rather than losing
    /// diffs. Dropping the receiver unsubscribes.
    pub fn subscribe_changes(&self) -> mpsc::Receiver<Vec<S::Diff>> {
        let (tx, rx) = mpsc::channel(self.inner.change_capacity);
        self.inner.change_subs.lock().push(tx);
        rx
    }

    /// Stop reconciliation and release the topic subscriptions
    pub fn dispose(&self) {
        let _ = self.inner.cancel.send(true);
        self.inner.core.write().close();
    }
}

impl<S: TrackedState> Drop for Tracker<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

type PendingLoad<S> = Pin<
    Box<
        dyn Future<
                Output = Result<
                    (<S as TrackedState>::Snapshot, i64),
                    crate::loaders::SnapshotError,
                >,
            > + Send,
    >,
>;

async fn drive<S: TrackedState>(
    inner: Arc<Inner<S>>,
    loader: Arc<dyn SnapshotLoad<State = S>>,
    mut events: mpsc::Receiver<StreamItem>,
    retry: ReconnectConfig,
) {
    let mut cancel_rx = inner.cancel.subscribe();
    let mut pending: Option<PendingLoad<S>> = None;

    if matches!(inner.core.write().begin(), EngineAction::LoadSnapshot) {
        pending = Some(start_load(Arc::clone(&loader), retry.clone()));
    }

    loop {
        tokio::select! {
            _ = cancel_rx.changed() => break,
            result = poll_pending::<S>(&mut pending), if pending.is_some() => {
                pending = None;
                match result {
                    Ok((snapshot, as_of)) => {
                        let diffs = inner.core.write().complete_snapshot(snapshot, as_of);
                        publish(&inner, diffs).await;
                    }
                    Err(e) => {
                        inner.core.write().fail_snapshot(&e.message);
                        break;
                    }
                }
            }
            item = events.recv() => match item {
                None => break,
                Some(item) => {
                    let action = inner.core.write().handle_item(item);
                    match action {
                        EngineAction::Emit(diffs) => publish(&inner, diffs).await,
                        EngineAction::LoadSnapshot => {
                            pending = Some(start_load(Arc::clone(&loader), retry.clone()));
                        }
                        EngineAction::Idle => {}
                    }
                }
            },
        }
    }

    // Fault or stream end: stop the forwarders so the topic
    // subscriptions are released.
    let _ = inner.cancel.send(true);
    inner.core.write().close();
}

fn start_load<S: TrackedState>(
    loader: Arc<dyn SnapshotLoad<State = S>>,
    retry: ReconnectConfig,
) -> PendingLoad<S> {
    Box::pin(async move { load_with_retry(loader.as_ref(), &retry).await })
}

async fn poll_pending<S: TrackedState>(
    pending: &mut Option<PendingLoad<S>>,
) -> Result<(S::Snapshot, i64), crate::loaders::SnapshotError> {
    match pending.as_mut() {
        Some(load) => load.await,
        None => std::future::pending().await,
    }
}

async fn publish<S: TrackedState>(inner: &Inner<S>, diffs: Vec<S::Diff>) {
    if diffs.is_empty() {
        return;
    }
    let senders: Vec<mpsc::Sender<Vec<S::Diff>>> = {
        let mut subs = inner.change_subs.lock();
        subs.retain(|tx| !tx.is_closed());
        subs.clone()
    };
    for tx in senders {
        // A closed receiver just means the subscriber is mid-drop
        let _ = tx.send(diffs.clone()).await;
    }
}
