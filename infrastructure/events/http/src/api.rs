use async_trait::async_trait;
use common_errors::RequestResult;
use events_models::{Event, EventImage, EventInput};
use events_queries::EventFilter;
use tokio_util::sync::CancellationToken;

/// One network operation per call against the events API, no retries.
/// A fired token aborts the request and yields `Cancelled`.
#[async_trait]
pub trait EventsApi: Send + Sync {
    async fn list_events(
        &self, filter: &EventFilter, cancel: &CancellationToken,
    ) -> RequestResult<Vec<Event>>;

    async fn get_event(
        &self, id: &str, cancel: &CancellationToken,
    ) -> RequestResult<Event>;

    async fn list_images(
        &self, cancel: &CancellationToken,
    ) -> RequestResult<Vec<EventImage>>;

    async fn create_event(
        &self, input: &EventInput, cancel: &CancellationToken,
    ) -> RequestResult<Event>;

    async fn update_event(
        &self, id: &str, input: &EventInput, cancel: &CancellationToken,
    ) -> RequestResult<Event>;

    async fn delete_event(
        &self, id: &str, cancel: &CancellationToken,
    ) -> RequestResult<()>;
}
