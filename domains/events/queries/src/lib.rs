use events_cache_keys::{event_detail, event_images, event_list, event_search};
use events_models::{Event, EventImage};
use query_cache::{Query, QueryKey};
use serde::{Deserialize, Serialize};

/// Filter accepted by `GET /events`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub search: Option<String>,
    pub max: Option<u32>,
}

impl EventFilter {
    /// Query string pairs; a blank search term is not sent.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(max) = self.max {
            pairs.push(("max", max.to_string()));
        }
        pairs
    }
}

/// Most recent events, optionally capped at `max`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecentEventsQuery {
    pub max: Option<u32>,
}

/// Events matching a search term. Nothing is fetched until a term exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchEventsQuery {
    pub term: Option<String>,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GetEventQuery {
    pub event_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListImagesQuery;

impl SearchEventsQuery {
    pub fn new(term: Option<impl Into<String>>) -> Self {
        Self {
            term: term.map(Into::into),
            max: None,
        }
    }

    pub fn is_enabled(&self) -> bool { self.term.is_some() }
}

impl From<&RecentEventsQuery> for EventFilter {
    fn from(query: &RecentEventsQuery) -> Self {
        Self {
            search: None,
            max: query.max,
        }
    }
}

impl From<&SearchEventsQuery> for EventFilter {
    fn from(query: &SearchEventsQuery) -> Self {
        Self {
            search: query.term.clone(),
            max: query.max,
        }
    }
}

impl Query for RecentEventsQuery {
    type Output = Vec<Event>;

    fn key(&self) -> QueryKey { event_list(self.max) }
}

impl Query for SearchEventsQuery {
    type Output = Vec<Event>;

    fn key(&self) -> QueryKey { event_search(self.term.as_deref(), self.max) }

    fn enabled(&self) -> bool { self.is_enabled() }
}

impl Query for GetEventQuery {
    type Output = Event;

    fn key(&self) -> QueryKey { event_detail(&self.event_id) }
}

impl Query for ListImagesQuery {
    type Output = Vec<EventImage>;

    fn key(&self) -> QueryKey { event_images() }
}
