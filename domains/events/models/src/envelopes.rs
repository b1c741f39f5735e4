//! Wire shapes wrapping payloads of the events API.

use serde::{Deserialize, Serialize};

use crate::{Event, EventImage};

/// `GET /events` response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsEnvelope {
    pub events: Vec<Event>,
}

/// `POST`/`PUT` body (`EventInput`) and response (`Event`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<T = Event> {
    pub event: T,
}

/// `GET /events/images` response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesEnvelope {
    pub images: Vec<EventImage>,
}
