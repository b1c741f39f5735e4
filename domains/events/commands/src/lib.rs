use common_errors::{RequestError, RequestResult};
use events_models::{Event, EventInput};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventCommand {
    pub event: EventInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEventCommand {
    #[serde(skip)]
    pub event_id: String,
    pub event: EventInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteEventCommand {
    pub event_id: String,
}

impl UpdateEventCommand {
    /// The event as it should look once the server accepts the update.
    pub fn optimistic_event(&self) -> Event {
        Event::from_input(self.event_id.clone(), self.event.clone())
    }
}

/// Rejects ids no URL can be built from.
pub fn validate_event_id(event_id: &str) -> RequestResult<()> {
    if event_id.trim().is_empty() {
        return Err(RequestError::Validation(
            "event id must not be empty".to_string(),
        ));
    }
    Ok(())
}
