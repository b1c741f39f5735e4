use std::{sync::Arc, time::Duration};

use common_errors::RequestResult;
use events_http::EventsApi;
use events_models::{Event, EventImage};
use events_queries::{
    EventFilter, GetEventQuery, ListImagesQuery, RecentEventsQuery,
    SearchEventsQuery,
};
use query_cache::{
    CancellationToken, Query, QueryCache, QueryFn, QueryResult, ReadPolicy,
    query_fn, read_query,
};
use tracing::instrument;

/// Lists are always revalidated on read.
pub const LIST_STALE_TIME: Duration = Duration::ZERO;
/// The edit form keeps its event for 10 seconds.
pub const EDIT_STALE_TIME: Duration = Duration::from_secs(10);
/// Selectable images rarely change.
pub const IMAGES_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Cached reads of the events API.
#[derive(Clone)]
pub struct EventQueryHandlers {
    cache: QueryCache,
    api: Arc<dyn EventsApi>,
}

impl EventQueryHandlers {
    pub fn new(cache: QueryCache, api: Arc<dyn EventsApi>) -> Self {
        Self { cache, api }
    }

    pub fn cache(&self) -> &QueryCache { &self.cache }

    #[instrument(skip(self, cancel))]
    pub async fn recent_events(
        &self, query: &RecentEventsQuery, cancel: Option<&CancellationToken>,
    ) -> RequestResult<QueryResult<Vec<Event>>> {
        let policy = ReadPolicy::default().stale_time(LIST_STALE_TIME);
        read_query(
            &self.cache,
            query,
            policy,
            self.list_fn(EventFilter::from(query)),
            cancel,
        )
        .await
    }

    /// Reports `Idle` without a request until the query carries a term.
    #[instrument(skip(self, cancel))]
    pub async fn search_events(
        &self, query: &SearchEventsQuery, cancel: Option<&CancellationToken>,
    ) -> RequestResult<QueryResult<Vec<Event>>> {
        let policy = ReadPolicy::default().stale_time(LIST_STALE_TIME);
        read_query(
            &self.cache,
            query,
            policy,
            self.list_fn(EventFilter::from(query)),
            cancel,
        )
        .await
    }

    #[instrument(skip(self, cancel))]
    pub async fn get_event(
        &self, query: &GetEventQuery, cancel: Option<&CancellationToken>,
    ) -> RequestResult<QueryResult<Event>> {
        read_query(
            &self.cache,
            query,
            ReadPolicy::default(),
            self.event_fn(query.event_id.clone()),
            cancel,
        )
        .await
    }

    /// Detail read for the edit form.
    #[instrument(skip(self, cancel))]
    pub async fn get_event_for_edit(
        &self, query: &GetEventQuery, cancel: Option<&CancellationToken>,
    ) -> RequestResult<QueryResult<Event>> {
        let policy = ReadPolicy::default().stale_time(EDIT_STALE_TIME);
        read_query(
            &self.cache,
            query,
            policy,
            self.event_fn(query.event_id.clone()),
            cancel,
        )
        .await
    }

    /// Blocking load: the cached event when fresh, otherwise the network
    /// result or its error.
    #[instrument(skip(self, cancel))]
    pub async fn load_event(
        &self, query: &GetEventQuery, cancel: Option<&CancellationToken>,
    ) -> RequestResult<Event> {
        let policy = ReadPolicy::default().stale_time(EDIT_STALE_TIME);
        let value = self
            .cache
            .fetch(
                &query.key(),
                &policy,
                self.event_fn(query.event_id.clone()),
                cancel,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    #[instrument(skip(self, cancel))]
    pub async fn list_images(
        &self, cancel: Option<&CancellationToken>,
    ) -> RequestResult<QueryResult<Vec<EventImage>>> {
        let api = self.api.clone();
        let fetch = query_fn(move |cancel| {
            let api = api.clone();
            async move { api.list_images(&cancel).await }
        });
        let policy = ReadPolicy::default().stale_time(IMAGES_STALE_TIME);
        read_query(&self.cache, &ListImagesQuery, policy, fetch, cancel).await
    }

    /// Warm the detail entry without waiting.
    pub fn prefetch_event(&self, query: &GetEventQuery) -> bool {
        self.cache.prefetch(
            &query.key(),
            &ReadPolicy::default().stale_time(EDIT_STALE_TIME),
            self.event_fn(query.event_id.clone()),
        )
    }

    fn list_fn(&self, filter: EventFilter) -> QueryFn {
        let api = self.api.clone();
        query_fn(move |cancel| {
            let api = api.clone();
            let filter = filter.clone();
            async move { api.list_events(&filter, &cancel).await }
        })
    }

    fn event_fn(&self, event_id: String) -> QueryFn {
        let api = self.api.clone();
        query_fn(move |cancel| {
            let api = api.clone();
            let event_id = event_id.clone();
            async move { api.get_event(&event_id, &cancel).await }
        })
    }
}
