use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use flume::{Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Topic name to the senders subscribed to it
type SubscriberRegistry<E> = Arc<RwLock<HashMap<String, Vec<Sender<Envelope<E>>>>>>;

/// Topic-routed notification bus.
///
/// Publishing never blocks: every subscriber owns an unbounded flume channel
/// and subscribers whose receiver was dropped are pruned on the next publish
/// to their topic.
#[derive(Clone)]
pub struct EventBus<E> {
    /// Subscribers registered for a single topic
    subscribers: SubscriberRegistry<E>,

    /// Subscribers that receive every topic
    wildcard: Arc<RwLock<Vec<Sender<Envelope<E>>>>>,

    metrics: Arc<EventBusMetrics>,
}

/// Payload wrapper carrying the routing topic and a bus-wide sequence number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<E> {
    pub sequence: u64,
    pub topic: String,
    pub payload: E,
}

#[derive(Default)]
pub struct EventBusMetrics {
    pub events_published: AtomicU64,
    pub events_delivered: AtomicU64,
    pub subscribers_pruned: AtomicU64,
}

impl<E> Default for EventBus<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self { Self::new() }
}

impl<E> EventBus<E>
where
    E: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            wildcard: Arc::new(RwLock::new(Vec::new())),
            metrics: Arc::new(EventBusMetrics::default()),
        }
    }

    /// Deliver `payload` to the subscribers of `topic` and to every wildcard
    /// subscriber. Returns the number of receivers reached.
    pub fn publish(&self, topic: impl Into<String>, payload: E) -> usize {
        let topic = topic.into();
        let sequence = self
            .metrics
            .events_published
            .fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope {
            sequence,
            topic,
            payload,
        };

        let mut delivered = 0;
        let mut pruned = 0;

        {
            let mut subscribers = self.subscribers.write();
            if let Some(subs) = subscribers.get_mut(&envelope.topic) {
                let before = subs.len();
                subs.retain(|tx| tx.send(envelope.clone()).is_ok());
                delivered += subs.len();
                pruned += before - subs.len();
                if subs.is_empty() {
                    subscribers.remove(&envelope.topic);
                }
            }
        }

        {
            let mut wildcard = self.wildcard.write();
            let before = wildcard.len();
            wildcard.retain(|tx| tx.send(envelope.clone()).is_ok());
            delivered += wildcard.len();
            pruned += before - wildcard.len();
        }

        if pruned > 0 {
            trace!(topic = %envelope.topic, pruned, "pruned closed subscribers");
            self.metrics
                .subscribers_pruned
                .fetch_add(pruned as u64, Ordering::Relaxed);
        }
        self.metrics
            .events_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);

        delivered
    }

    /// Subscribe to a single topic. Dropping the receiver unsubscribes.
    pub fn subscribe(&self, topic: impl Into<String>) -> Receiver<Envelope<E>> {
        let (tx, rx) = flume::unbounded();
        self.subscribers
            .write()
            .entry(topic.into())
            .or_default()
            .push(tx);
        rx
    }

    /// Subscribe to every topic.
    pub fn subscribe_all(&self) -> Receiver<Envelope<E>> {
        let (tx, rx) = flume::unbounded();
        self.wildcard.write().push(tx);
        rx
    }

    /// Live subscribers, counting topic and wildcard subscribers.
    pub fn subscriber_count(&self) -> usize {
        let topics: usize = self.subscribers.read().values().map(Vec::len).sum();
        topics + self.wildcard.read().len()
    }

    pub fn metrics(&self) -> EventBusSnapshot {
        EventBusSnapshot {
            events_published: self
                .metrics
                .events_published
                .load(Ordering::Relaxed),
            events_delivered: self
                .metrics
                .events_delivered
                .load(Ordering::Relaxed),
            subscribers: self.subscriber_count() as u64,
            subscribers_pruned: self
                .metrics
                .subscribers_pruned
                .load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of event bus counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusSnapshot {
    pub events_published: u64,
    pub events_delivered: u64,
    pub subscribers: u64,
    pub subscribers_pruned: u64,
}
