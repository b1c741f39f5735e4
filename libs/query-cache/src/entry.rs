use std::time::Duration;

use chrono::{DateTime, Utc};
use common_errors::{RequestError, RequestResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use crate::key::QueryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Never requested, or the query is disabled.
    Idle,
    /// First fetch outstanding, nothing cached yet.
    Loading,
    Success,
    Error,
}

/// Snapshot of what the cache holds for one key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub value: Option<Value>,
    pub fetched_at: Option<Instant>,
    pub updated_at: Option<DateTime<Utc>>,
    pub status: QueryStatus,
    pub is_fetching: bool,
    pub error: Option<RequestError>,
    pub invalidated: bool,
    pub stale_after: Duration,
    pub observers: usize,
}

impl CacheEntry {
    pub(crate) fn new(key: QueryKey, stale_after: Duration) -> Self {
        Self {
            key,
            value: None,
            fetched_at: None,
            updated_at: None,
            status: QueryStatus::Idle,
            is_fetching: false,
            error: None,
            invalidated: false,
            stale_after,
            observers: 0,
        }
    }

    /// Stale once invalidated, never fetched, or older than `stale_after`.
    pub fn is_stale_at(&self, now: Instant) -> bool {
        if self.invalidated {
            return true;
        }
        match self.fetched_at {
            Some(fetched_at) => {
                now.saturating_duration_since(fetched_at) > self.stale_after
            }
            None => true,
        }
    }

    pub fn is_stale(&self) -> bool { self.is_stale_at(Instant::now()) }

    pub fn has_value(&self) -> bool { self.value.is_some() }

    /// Decode the cached JSON into the query's output type.
    pub fn decode<T: DeserializeOwned>(&self) -> RequestResult<Option<T>> {
        self.value
            .as_ref()
            .map(|value| T::deserialize(value).map_err(RequestError::from))
            .transpose()
    }
}

/// Per-read freshness and fetch behaviour.
#[derive(Debug, Clone)]
pub struct ReadPolicy {
    /// Overrides the cache-wide default freshness window.
    pub stale_time: Option<Duration>,
    /// Disabled reads never fetch and report `Idle` until data exists.
    pub enabled: bool,
    /// Refetch a stale entry that already holds a value. When false the stale
    /// value is served as is.
    pub refetch_on_observe: bool,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            stale_time: None,
            enabled: true,
            refetch_on_observe: true,
        }
    }
}

impl ReadPolicy {
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn refetch_on_observe(mut self, refetch: bool) -> Self {
        self.refetch_on_observe = refetch;
        self
    }
}

/// What `invalidate` does with matching entries that have observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefetchType {
    /// Refetch observed entries in the background right away.
    #[default]
    Active,
    /// Only mark stale; the next read refetches.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEventKind {
    FetchStarted,
    /// A fetch finished, whatever its outcome.
    FetchSettled,
    /// Value or status changed (successful fetch, write, rollback).
    Updated,
    Invalidated,
    Removed,
}

#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub kind: CacheEventKind,
    pub status: QueryStatus,
}

/// Typed view over a [`CacheEntry`].
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub status: QueryStatus,
    pub data: Option<T>,
    pub error: Option<RequestError>,
    pub is_fetching: bool,
    pub is_stale: bool,
}

/// The one state a reader renders.
#[derive(Debug, PartialEq)]
pub enum QueryView<'a, T> {
    Idle,
    Loading,
    Error(&'a RequestError),
    Data(&'a T),
}

impl<T: DeserializeOwned> QueryResult<T> {
    pub fn from_entry(entry: &CacheEntry) -> RequestResult<Self> {
        Ok(Self {
            status: entry.status,
            data: entry.decode()?,
            error: entry.error.clone(),
            is_fetching: entry.is_fetching,
            is_stale: entry.is_stale(),
        })
    }
}

impl<T> QueryResult<T> {
    /// Cached data wins over a background error, matching
    /// stale-while-revalidate.
    pub fn view(&self) -> QueryView<'_, T> {
        if let Some(data) = &self.data {
            return QueryView::Data(data);
        }
        match (&self.status, &self.error) {
            (QueryStatus::Error, Some(err)) => QueryView::Error(err),
            (QueryStatus::Loading, _) => QueryView::Loading,
            _ => QueryView::Idle,
        }
    }

    pub fn into_data(self) -> Option<T> { self.data }
}
