use event_bus::Envelope;
use flume::Receiver;

use crate::{
    cache::QueryCache,
    entry::{CacheEntry, CacheEvent},
    key::QueryKey,
};

/// Active reader of one key. While alive the entry is never garbage
/// collected and `invalidate` refetches it.
pub struct QueryObserver {
    cache: QueryCache,
    key: QueryKey,
    rx: Receiver<Envelope<CacheEvent>>,
}

impl QueryObserver {
    pub(crate) fn new(
        cache: QueryCache, key: QueryKey, rx: Receiver<Envelope<CacheEvent>>,
    ) -> Self {
        Self { cache, key, rx }
    }

    pub fn key(&self) -> &QueryKey { &self.key }

    pub fn current(&self) -> Option<CacheEntry> { self.cache.peek(&self.key) }

    /// Wait for the next change to the observed entry.
    pub async fn changed(&self) -> Option<CacheEvent> {
        self.rx
            .recv_async()
            .await
            .ok()
            .map(|envelope| envelope.payload)
    }

    /// Drain events that have already arrived.
    pub fn pending(&self) -> Vec<CacheEvent> {
        self.rx.try_iter().map(|envelope| envelope.payload).collect()
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) { self.cache.unobserve(&self.key); }
}
