//! Topic registry: reference-counted subscriptions with generation stamps
//!
//! The adapter multiplexes any number of trackers onto one socket. Each
//! topic has a reference-counted subscriber list and a subscription
//! generation counter that is bumped on every reconnect; every event is
//! stamped with its topic's current generation before delivery.

use crate::events::{StampedEvent, StreamItem, StreamStatus};
use bybit_types::UpdateEvent;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Default per-subscriber channel capacity
///
/// Channels are bounded: when a consumer falls behind, delivery awaits
/// capacity instead of dropping events, which back-pressures the socket
/// read loop.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// Requests from the adapter to the connection loop
#[derive(Debug)]
pub(crate) enum ControlMsg {
    Subscribe(String),
    Unsubscribe(String),
}

struct TopicEntry {
    generation: u64,
    subscribers: Vec<(u64, mpsc::Sender<StreamItem>)>,
}

/// Reference-counted subscription registry shared by one socket connection
pub struct StreamAdapter {
    topics: DashMap<String, TopicEntry>,
    next_subscriber_id: AtomicU64,
    channel_capacity: usize,
    control_tx: mpsc::UnboundedSender<ControlMsg>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<ControlMsg>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl StreamAdapter {
    /// Create a new adapter
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new adapter with a custom subscriber channel capacity
    pub fn with_capacity(channel_capacity: usize) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            topics: DashMap::new(),
            next_subscriber_id: AtomicU64::new(0),
            channel_capacity,
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            shutdown_tx,
        }
    }

    /// Subscribe to a topic
    ///
    /// The first subscriber for a topic triggers the socket subscription;
    /// later subscribers share it. Dropping the returned handle releases
    /// the reference, and the socket subscription is removed when the last
    /// one goes.
    pub fn subscribe(self: &Arc<Self>, topic: &str) -> SubscriptionHandle {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let mut entry = self.topics.entry(topic.to_string()).or_insert(TopicEntry {
            generation: 0,
            subscribers: Vec::new(),
        });
        let first = entry.subscribers.is_empty();
        entry.subscribers.push((id, tx));
        drop(entry);

        if first {
            debug!("First subscriber for {topic}, requesting socket subscription");
            let _ = self.control_tx.send(ControlMsg::Subscribe(topic.to_string()));
        }

        SubscriptionHandle {
            topic: topic.to_string(),
            id,
            rx,
            adapter: Arc::clone(self),
        }
    }

    fn remove_subscriber(&self, topic: &str, id: u64) {
        let mut last = false;
        if let Some(mut entry) = self.topics.get_mut(topic) {
            entry.subscribers.retain(|(sid, _)| *sid != id);
            last = entry.subscribers.is_empty();
        }
        if last {
            self.topics.remove(topic);
            debug!("Last subscriber for {topic} gone, removing socket subscription");
            let _ = self
                .control_tx
                .send(ControlMsg::Unsubscribe(topic.to_string()));
        }
    }

    /// Topics with at least one subscriber (for restoration after reconnect)
    pub fn active_topics(&self) -> Vec<String> {
        self.topics.iter().map(|e| e.key().clone()).collect()
    }

    /// Current generation of a topic (0 if unknown)
    pub fn generation(&self, topic: &str) -> u64 {
        self.topics.get(topic).map(|e| e.generation).unwrap_or(0)
    }

    /// Bump the generation of every topic
    ///
    /// Called by the connection loop when the socket drops: events from the
    /// old connection must not be mistaken for contiguous with events from
    /// the next one.
    pub fn bump_generations(&self) {
        for mut entry in self.topics.iter_mut() {
            entry.generation += 1;
        }
    }

    /// Deliver events for a topic, stamped with its current generation
    ///
    /// Awaits subscriber channel capacity: slow consumers back-pressure the
    /// caller rather than losing events.
    pub async fn dispatch(&self, topic: &str, events: Vec<UpdateEvent>) {
        let (generation, senders) = match self.topics.get(topic) {
            Some(entry) => (
                entry.generation,
                entry
                    .subscribers
                    .iter()
                    .map(|(_, tx)| tx.clone())
                    .collect::<Vec<_>>(),
            ),
            None => {
                warn!("Dropping {} events for unsubscribed topic {topic}", events.len());
                return;
            }
        };

        for event in events {
            for tx in &senders {
                let item = StreamItem::Event(StampedEvent {
                    event: event.clone(),
                    generation,
                });
                // A closed receiver just means the handle is mid-drop
                let _ = tx.send(item).await;
            }
        }
    }

    /// Send a status transition to every subscriber of every topic
    pub async fn broadcast_status(&self, status: StreamStatus) {
        let senders: Vec<mpsc::Sender<StreamItem>> = self
            .topics
            .iter()
            .flat_map(|e| e.subscribers.iter().map(|(_, tx)| tx.clone()).collect::<Vec<_>>())
            .collect();
        for tx in senders {
            let _ = tx.send(StreamItem::Status(status.clone())).await;
        }
    }

    /// Announce that a topic is subscribed at its current generation
    pub async fn announce_subscribed(&self, topic: &str) {
        let (generation, senders) = match self.topics.get(topic) {
            Some(entry) => (
                entry.generation,
                entry
                    .subscribers
                    .iter()
                    .map(|(_, tx)| tx.clone())
                    .collect::<Vec<_>>(),
            ),
            None => return,
        };
        for tx in senders {
            let _ = tx
                .send(StreamItem::Status(StreamStatus::Subscribed { generation }))
                .await;
        }
    }

    // Connection loop side: take the control receiver (once)
    pub(crate) fn take_control_rx(&self) -> Option<mpsc::UnboundedReceiver<ControlMsg>> {
        self.control_rx.lock().take()
    }

    /// Request shutdown of the connection loop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub(crate) fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

impl Default for StreamAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one topic subscription
///
/// Receives [`StreamItem`]s until dropped; dropping releases the topic
/// reference.
pub struct SubscriptionHandle {
    topic: String,
    id: u64,
    rx: mpsc::Receiver<StreamItem>,
    adapter: Arc<StreamAdapter>,
}

impl SubscriptionHandle {
    /// The subscribed topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive the next item; `None` once the adapter shuts down
    pub async fn recv(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.adapter.remove_subscriber(&self.topic, self.id);
    }
}
