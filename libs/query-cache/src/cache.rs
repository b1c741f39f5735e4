use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use common_errors::{RequestError, RequestResult};
use event_bus::{EventBus, Envelope};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::{
    config::QueryCacheConfig,
    entry::{CacheEntry, CacheEvent, CacheEventKind, QueryStatus, ReadPolicy, RefetchType},
    key::QueryKey,
    observer::QueryObserver,
    query::QueryFn,
};

type SharedFetch = Shared<BoxFuture<'static, RequestResult<Value>>>;

/// Process-wide query cache. Cloning shares the same store.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: QueryCacheConfig,
    state: Mutex<State>,
    bus: EventBus<CacheEvent>,
    next_fetch_id: AtomicU64,
    pending_mutations: AtomicUsize,
}

#[derive(Default)]
struct State {
    entries: HashMap<QueryKey, Slot>,
    in_flight: HashMap<QueryKey, InFlight>,
}

struct Slot {
    entry: CacheEntry,
    query_fn: Option<QueryFn>,
    idle_since: Option<Instant>,
    write_seq: u64,
}

struct InFlight {
    id: u64,
    outcome: SharedFetch,
    cancel: CancellationToken,
    waiters: usize,
    /// Background refetches are never aborted by a reader going away.
    detached: bool,
    status_before: QueryStatus,
    /// Invalidated while running; its result is stored but stays stale.
    superseded: bool,
    /// Start a fresh fetch once this one settles.
    refetch_after: bool,
}

/// Entry state captured before an optimistic write.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub key: QueryKey,
    pub previous: Option<CacheEntry>,
}

impl Default for QueryCache {
    fn default() -> Self { Self::new(QueryCacheConfig::default()) }
}

impl QueryCache {
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                bus: EventBus::new(),
                next_fetch_id: AtomicU64::new(1),
                pending_mutations: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &QueryCacheConfig { &self.inner.config }

    /// Serve `key` according to `policy`.
    ///
    /// Fresh entries return without touching the network. A stale entry that
    /// holds a value is returned as is while a background refetch runs. An
    /// entry without a value waits for the fetch and propagates its error.
    #[instrument(skip(self, policy, query_fn, cancel), fields(key = %key))]
    pub async fn read(
        &self, key: &QueryKey, policy: &ReadPolicy, query_fn: QueryFn,
        cancel: Option<&CancellationToken>,
    ) -> RequestResult<CacheEntry> {
        let pending = {
            let mut state = self.inner.state.lock();
            let now = Instant::now();
            let slot = self.slot_mut(&mut state, key, now);
            slot.entry.stale_after = self.stale_window(policy);
            if !policy.enabled {
                return Ok(slot.entry.clone());
            }
            slot.query_fn = Some(query_fn.clone());

            if !slot.entry.is_stale_at(now) {
                debug!("Cache hit for {}", key);
                return Ok(slot.entry.clone());
            }

            if slot.entry.has_value() {
                if policy.refetch_on_observe {
                    debug!("Serving stale {} while revalidating", key);
                    self.spawn_background_fetch(&mut state, key, &query_fn);
                }
                return Ok(self.entry_of(&state, key));
            }

            debug!("Cache miss for {}, fetching", key);
            self.join_fetch(&mut state, key, &query_fn)
        };

        self.await_fetch(key, pending, cancel).await?;
        Ok(self
            .peek(key)
            .unwrap_or_else(|| CacheEntry::new(key.clone(), Duration::ZERO)))
    }

    /// Blocking fetch: cached value when fresh, otherwise the result of the
    /// network call (errors always propagate).
    #[instrument(skip(self, policy, query_fn, cancel), fields(key = %key))]
    pub async fn fetch(
        &self, key: &QueryKey, policy: &ReadPolicy, query_fn: QueryFn,
        cancel: Option<&CancellationToken>,
    ) -> RequestResult<Value> {
        let pending = {
            let mut state = self.inner.state.lock();
            let now = Instant::now();
            let slot = self.slot_mut(&mut state, key, now);
            slot.entry.stale_after = self.stale_window(policy);
            slot.query_fn = Some(query_fn.clone());

            if let (false, Some(value)) =
                (slot.entry.is_stale_at(now), &slot.entry.value)
            {
                debug!("Cache hit for {}", key);
                return Ok(value.clone());
            }
            self.join_fetch(&mut state, key, &query_fn)
        };

        self.await_fetch(key, pending, cancel).await
    }

    /// Start a background fetch when the entry is stale. Never waits.
    pub fn prefetch(
        &self, key: &QueryKey, policy: &ReadPolicy, query_fn: QueryFn,
    ) -> bool {
        let mut state = self.inner.state.lock();
        let now = Instant::now();
        let slot = self.slot_mut(&mut state, key, now);
        slot.entry.stale_after = self.stale_window(policy);
        slot.query_fn = Some(query_fn.clone());
        if !slot.entry.is_stale_at(now) {
            return false;
        }
        self.spawn_background_fetch(&mut state, key, &query_fn);
        true
    }

    /// Overwrite the value for `key` and mark it freshly fetched.
    pub fn write(&self, key: &QueryKey, value: Value) {
        let mut state = self.inner.state.lock();
        self.write_locked(&mut state, key, value);
    }

    pub(crate) fn write_tracked(&self, key: &QueryKey, value: Value) -> u64 {
        let mut state = self.inner.state.lock();
        self.write_locked(&mut state, key, value)
    }

    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        let state = self.inner.state.lock();
        state.entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Mark every entry under `prefix` stale. Observed entries are refetched
    /// in the background unless `refetch` is [`RefetchType::None`].
    #[instrument(skip(self), fields(prefix = %prefix))]
    pub fn invalidate(&self, prefix: &QueryKey, refetch: RefetchType) -> usize {
        let mut state = self.inner.state.lock();
        let mut matched = 0;
        let mut refetches = Vec::new();
        let State {
            entries,
            in_flight,
        } = &mut *state;

        for (key, slot) in entries.iter_mut() {
            if !key.starts_with(prefix) {
                continue;
            }
            matched += 1;
            slot.entry.invalidated = true;
            self.publish(&slot.entry, CacheEventKind::Invalidated);
            let refetch_now =
                refetch == RefetchType::Active && slot.entry.observers > 0;

            match in_flight.get_mut(key) {
                // The running request may predate whatever caused the
                // invalidation.
                Some(running) => {
                    running.superseded = true;
                    running.refetch_after |= refetch_now;
                    running.detached |= refetch_now;
                }
                None if refetch_now => {
                    if let Some(query_fn) = &slot.query_fn {
                        refetches.push((key.clone(), query_fn.clone()));
                    }
                }
                None => {}
            }
        }

        for (key, query_fn) in refetches {
            self.spawn_background_fetch(&mut state, &key, &query_fn);
        }

        debug!(matched, "Invalidated {}", prefix);
        matched
    }

    /// Drop the entry entirely, aborting any fetch for it.
    pub fn remove(&self, key: &QueryKey) -> bool {
        let mut state = self.inner.state.lock();
        if let Some(in_flight) = state.in_flight.remove(key) {
            in_flight.cancel.cancel();
        }
        match state.entries.remove(key) {
            Some(slot) => {
                self.publish(&slot.entry, CacheEventKind::Removed);
                debug!("Removed {}", key);
                true
            }
            None => false,
        }
    }

    /// Abort the in-flight fetch for `key` and wait until it has settled.
    pub async fn cancel(&self, key: &QueryKey) {
        let outcome = {
            let state = self.inner.state.lock();
            state.in_flight.get(key).map(|in_flight| {
                in_flight.cancel.cancel();
                in_flight.outcome.clone()
            })
        };
        if let Some(outcome) = outcome {
            let _ = outcome.await;
        }
    }

    /// Register an active reader of `key`.
    pub fn observe(&self, key: &QueryKey) -> QueryObserver {
        let rx = self.inner.bus.subscribe(key.to_string());
        let mut state = self.inner.state.lock();
        let slot = self.slot_mut(&mut state, key, Instant::now());
        slot.entry.observers += 1;
        slot.idle_since = None;
        QueryObserver::new(self.clone(), key.clone(), rx)
    }

    /// Register an active reader that, when `policy` allows it, refetches
    /// the entry in the background if it is stale on attach.
    pub fn observe_with(
        &self, key: &QueryKey, policy: &ReadPolicy, query_fn: QueryFn,
    ) -> QueryObserver {
        let observer = self.observe(key);
        if !policy.enabled {
            return observer;
        }

        let mut state = self.inner.state.lock();
        let now = Instant::now();
        let slot = self.slot_mut(&mut state, key, now);
        slot.entry.stale_after = self.stale_window(policy);
        slot.query_fn = Some(query_fn.clone());
        if policy.refetch_on_observe && slot.entry.is_stale_at(now) {
            debug!("Observer attached to stale {}, refetching", key);
            self.spawn_background_fetch(&mut state, key, &query_fn);
        }
        observer
    }

    pub(crate) fn unobserve(&self, key: &QueryKey) {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.entries.get_mut(key) {
            slot.entry.observers = slot.entry.observers.saturating_sub(1);
            if slot.entry.observers == 0 {
                slot.idle_since = Some(Instant::now());
            }
        }
    }

    /// Every cache event, for every key.
    pub fn subscribe_all(&self) -> flume::Receiver<Envelope<CacheEvent>> {
        self.inner.bus.subscribe_all()
    }

    /// Number of fetches currently outstanding.
    pub fn fetching_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    pub fn pending_mutations(&self) -> usize {
        self.inner.pending_mutations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize { self.inner.state.lock().entries.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Evict entries nobody has observed for `gc_time` and that have no
    /// fetch outstanding.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.inner.config.gc_time();
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        let State {
            entries,
            in_flight,
        } = &mut *state;

        let expired: Vec<QueryKey> = entries
            .iter()
            .filter(|(key, slot)| {
                slot.entry.observers == 0
                    && !in_flight.contains_key(*key)
                    && slot.idle_since.is_some_and(|since| {
                        now.saturating_duration_since(since) >= gc_time
                    })
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(slot) = entries.remove(key) {
                self.publish(&slot.entry, CacheEventKind::Removed);
            }
        }
        if !expired.is_empty() {
            trace!(evicted = expired.len(), "Garbage collected idle entries");
        }
        expired.len()
    }

    /// Run [`QueryCache::collect_garbage`] every `period`.
    pub fn spawn_gc(&self, period: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                cache.collect_garbage();
            }
        })
    }

    pub(crate) fn mutation_started(&self) {
        self.inner.pending_mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mutation_settled(&self) {
        self.inner.pending_mutations.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, key: &QueryKey) -> Snapshot {
        let state = self.inner.state.lock();
        let slot = state.entries.get(key);
        Snapshot {
            key: key.clone(),
            previous: slot.map(|slot| slot.entry.clone()),
        }
    }

    /// Put back the state captured in `snapshot` unless the key has been
    /// written since `expected_seq`. Returns whether the rollback applied.
    pub(crate) fn rollback(&self, snapshot: &Snapshot, expected_seq: u64) -> bool {
        let mut state = self.inner.state.lock();
        let Some(slot) = state.entries.get_mut(&snapshot.key) else {
            return false;
        };
        if slot.write_seq != expected_seq {
            return false;
        }

        match &snapshot.previous {
            Some(previous) => {
                slot.entry.value = previous.value.clone();
                slot.entry.status = previous.status;
                slot.entry.error = previous.error.clone();
                slot.entry.fetched_at = previous.fetched_at;
                slot.entry.updated_at = previous.updated_at;
                slot.entry.invalidated = previous.invalidated;
            }
            None => {
                slot.entry.value = None;
                slot.entry.status = QueryStatus::Idle;
                slot.entry.error = None;
                slot.entry.fetched_at = None;
                slot.entry.updated_at = None;
            }
        }
        slot.write_seq += 1;
        self.publish(&slot.entry, CacheEventKind::Updated);
        true
    }

    fn stale_window(&self, policy: &ReadPolicy) -> Duration {
        policy
            .stale_time
            .unwrap_or_else(|| self.inner.config.stale_time())
    }

    fn slot_mut<'s>(
        &self, state: &'s mut State, key: &QueryKey, now: Instant,
    ) -> &'s mut Slot {
        self.slot_in(&mut state.entries, key, now)
    }

    fn slot_in<'s>(
        &self, entries: &'s mut HashMap<QueryKey, Slot>, key: &QueryKey,
        now: Instant,
    ) -> &'s mut Slot {
        let stale_after = self.inner.config.stale_time();
        entries.entry(key.clone()).or_insert_with(|| {
            trace!("Creating cache entry for {}", key);
            Slot {
                entry: CacheEntry::new(key.clone(), stale_after),
                query_fn: None,
                idle_since: Some(now),
                write_seq: 0,
            }
        })
    }

    fn entry_of(&self, state: &State, key: &QueryKey) -> CacheEntry {
        state
            .entries
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_else(|| CacheEntry::new(key.clone(), Duration::ZERO))
    }

    fn write_locked(
        &self, state: &mut State, key: &QueryKey, value: Value,
    ) -> u64 {
        let slot = self.slot_mut(state, key, Instant::now());
        slot.entry.value = Some(value);
        slot.entry.status = QueryStatus::Success;
        slot.entry.error = None;
        slot.entry.fetched_at = Some(Instant::now());
        slot.entry.updated_at = Some(Utc::now());
        slot.entry.invalidated = false;
        slot.write_seq += 1;
        self.publish(&slot.entry, CacheEventKind::Updated);
        slot.write_seq
    }

    /// Keep a fetch for `key` running for a background revalidation. A
    /// fetch already in flight is joined and no longer aborted when its
    /// blocking readers leave.
    fn spawn_background_fetch(
        &self, state: &mut State, key: &QueryKey, query_fn: &QueryFn,
    ) {
        self.ensure_fetch(state, key, query_fn).detached = true;
    }

    /// Join or start the fetch for `key` as a blocking reader. The reader is
    /// counted before the state lock is released.
    fn join_fetch(
        &self, state: &mut State, key: &QueryKey, query_fn: &QueryFn,
    ) -> (u64, SharedFetch) {
        let in_flight = self.ensure_fetch(state, key, query_fn);
        in_flight.waiters += 1;
        (in_flight.id, in_flight.outcome.clone())
    }

    fn ensure_fetch<'s>(
        &self, state: &'s mut State, key: &QueryKey, query_fn: &QueryFn,
    ) -> &'s mut InFlight {
        let State {
            entries,
            in_flight,
        } = state;
        match in_flight.entry(key.clone()) {
            Entry::Occupied(running) => {
                trace!("Joining in-flight fetch for {}", key);
                running.into_mut()
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.launch_fetch(entries, key, query_fn))
            }
        }
    }

    /// Start the request on its own task so it completes even if every
    /// caller goes away.
    fn launch_fetch(
        &self, entries: &mut HashMap<QueryKey, Slot>, key: &QueryKey,
        query_fn: &QueryFn,
    ) -> InFlight {
        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let slot = self.slot_in(entries, key, Instant::now());
        let status_before = slot.entry.status;
        slot.entry.is_fetching = true;
        if !slot.entry.has_value() {
            slot.entry.status = QueryStatus::Loading;
        }
        self.publish(&slot.entry, CacheEventKind::FetchStarted);

        let request = query_fn(cancel.clone());
        let token = cancel.clone();
        let cache = self.clone();
        let owned_key = key.clone();
        let outcome = async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(RequestError::Cancelled),
                result = request => result,
            };
            cache.settle_fetch(&owned_key, id, &result);
            result
        }
        .boxed()
        .shared();
        tokio::spawn(outcome.clone());

        InFlight {
            id,
            outcome,
            cancel,
            waiters: 0,
            detached: false,
            status_before,
            superseded: false,
            refetch_after: false,
        }
    }

    fn settle_fetch(
        &self, key: &QueryKey, id: u64, result: &RequestResult<Value>,
    ) {
        let mut state = self.inner.state.lock();
        // Removed or replaced while the request was outstanding.
        if !state.in_flight.get(key).is_some_and(|in_flight| in_flight.id == id) {
            return;
        }
        let Some(finished) = state.in_flight.remove(key) else {
            return;
        };

        let Some(slot) = state.entries.get_mut(key) else {
            return;
        };
        slot.entry.is_fetching = false;

        match result {
            Ok(value) => {
                debug!("Fetched {}", key);
                slot.entry.value = Some(value.clone());
                slot.entry.status = QueryStatus::Success;
                slot.entry.error = None;
                slot.entry.fetched_at = Some(Instant::now());
                slot.entry.updated_at = Some(Utc::now());
                slot.entry.invalidated = finished.superseded;
                slot.write_seq += 1;
                self.publish(&slot.entry, CacheEventKind::Updated);
            }
            Err(RequestError::Cancelled) => {
                debug!("Fetch for {} cancelled", key);
                slot.entry.status = finished.status_before;
            }
            Err(err) => {
                warn!("Fetch for {} failed: {}", key, err);
                slot.entry.status = QueryStatus::Error;
                slot.entry.error = Some(err.clone());
            }
        }
        self.publish(&slot.entry, CacheEventKind::FetchSettled);

        let cancelled = matches!(result, Err(RequestError::Cancelled));
        if finished.refetch_after && !cancelled {
            if let Some(query_fn) = slot.query_fn.clone() {
                debug!("Refetching {} invalidated mid-flight", key);
                self.spawn_background_fetch(&mut state, key, &query_fn);
            }
        }
    }

    async fn await_fetch(
        &self, key: &QueryKey, (id, outcome): (u64, SharedFetch),
        cancel: Option<&CancellationToken>,
    ) -> RequestResult<Value> {
        let mut waiter = Waiter {
            cache: self,
            key,
            id,
            finished: false,
        };
        let result = match cancel {
            Some(cancel) => {
                tokio::select! {
                    result = outcome => result,
                    _ = cancel.cancelled() => Err(RequestError::Cancelled),
                }
            }
            None => outcome.await,
        };
        waiter.finished = !matches!(result, Err(RequestError::Cancelled));
        result
    }

    fn publish(&self, entry: &CacheEntry, kind: CacheEventKind) {
        self.inner.bus.publish(entry.key.to_string(), CacheEvent {
            key: entry.key.clone(),
            kind,
            status: entry.status,
        });
    }
}

/// A caller blocked on a shared fetch, counted by `join_fetch`. When the
/// last one leaves early the request is aborted.
struct Waiter<'a> {
    cache: &'a QueryCache,
    key: &'a QueryKey,
    id: u64,
    finished: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut state = self.cache.inner.state.lock();
        let Some(in_flight) = state.in_flight.get_mut(self.key) else {
            return;
        };
        if in_flight.id != self.id {
            return;
        }
        in_flight.waiters = in_flight.waiters.saturating_sub(1);
        if !self.finished && in_flight.waiters == 0 && !in_flight.detached {
            debug!("Last reader of {} left, aborting fetch", self.key);
            in_flight.cancel.cancel();
        }
    }
}
