use query_cache::{KeyParams, QueryKey};

pub const EVENTS_NAMESPACE: &str = "events";
pub const IMAGES_NAMESPACE: &str = "events-images";

/// `["events"]`, the prefix of every event list and detail key.
pub fn events_root() -> QueryKey { QueryKey::new(EVENTS_NAMESPACE) }

/// `["events"]`, or `["events", {max}]` when capped.
pub fn event_list(max: Option<u32>) -> QueryKey {
    match max {
        Some(max) => {
            events_root().params(KeyParams::new().with("max", Some(max)))
        }
        None => events_root(),
    }
}

/// `["events", {search, max}]`
pub fn event_search(term: Option<&str>, max: Option<u32>) -> QueryKey {
    events_root().params(
        KeyParams::new()
            .with("search", term)
            .with("max", max),
    )
}

/// `["events", id]`
pub fn event_detail(id: &str) -> QueryKey { events_root().tag(id) }

/// `["events-images"]`, outside the `events` namespace.
pub fn event_images() -> QueryKey { QueryKey::new(IMAGES_NAMESPACE) }
