use std::sync::Arc;

use common_errors::RequestResult;
use events_cache_keys::{event_detail, events_root};
use events_commands::{
    CreateEventCommand, DeleteEventCommand, UpdateEventCommand,
    validate_event_id,
};
use events_http::EventsApi;
use events_models::Event;
use query_cache::{
    CancellationToken, MutationCoordinator, MutationPlan, QueryCache,
    RefetchType,
};
use tracing::{info, instrument};

/// Event mutations with their cache effects.
#[derive(Clone)]
pub struct EventCommandHandlers {
    coordinator: MutationCoordinator,
    api: Arc<dyn EventsApi>,
}

impl EventCommandHandlers {
    pub fn new(cache: QueryCache, api: Arc<dyn EventsApi>) -> Self {
        Self {
            coordinator: MutationCoordinator::new(cache),
            api,
        }
    }

    /// No optimistic step; every event list is refetched once created.
    #[instrument(skip(self, cancel))]
    pub async fn create_event(
        &self, command: CreateEventCommand, cancel: &CancellationToken,
    ) -> RequestResult<Event> {
        let plan = MutationPlan::new().invalidate(events_root(), RefetchType::Active);
        let event = self
            .coordinator
            .run("create-event", plan, self.api.create_event(&command.event, cancel))
            .await?;
        info!(event_id = %event.id, "Event created");
        Ok(event)
    }

    /// The detail entry shows the edited event until the server answers and
    /// reverts to its exact previous state if the update fails.
    #[instrument(skip(self, cancel), fields(event_id = %command.event_id))]
    pub async fn update_event(
        &self, command: UpdateEventCommand, cancel: &CancellationToken,
    ) -> RequestResult<Event> {
        validate_event_id(&command.event_id)?;
        let optimistic = serde_json::to_value(command.optimistic_event())?;
        let plan = MutationPlan::new()
            .optimistic(event_detail(&command.event_id), optimistic)
            .invalidate(events_root(), RefetchType::Active);

        self.coordinator
            .run(
                "update-event",
                plan,
                self.api
                    .update_event(&command.event_id, &command.event, cancel),
            )
            .await
    }

    /// Lists are only marked stale so nothing refetches the deleted event;
    /// its detail entry is dropped on success.
    #[instrument(skip(self, cancel), fields(event_id = %command.event_id))]
    pub async fn delete_event(
        &self, command: DeleteEventCommand, cancel: &CancellationToken,
    ) -> RequestResult<()> {
        validate_event_id(&command.event_id)?;
        let plan = MutationPlan::new()
            .invalidate(events_root(), RefetchType::None)
            .remove_on_success(event_detail(&command.event_id));

        self.coordinator
            .run(
                "delete-event",
                plan,
                self.api.delete_event(&command.event_id, cancel),
            )
            .await?;
        info!("Event deleted");
        Ok(())
    }

    /// Mutations started but not yet settled.
    pub fn pending(&self) -> usize {
        self.coordinator.cache().pending_mutations()
    }
}
