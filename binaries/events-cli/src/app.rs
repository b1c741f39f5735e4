use std::sync::Arc;

use common_errors::RequestResult;
use events_command_handlers::EventCommandHandlers;
use events_commands::{
    CreateEventCommand, DeleteEventCommand, UpdateEventCommand,
};
use events_http::EventsApi;
use events_queries::{GetEventQuery, RecentEventsQuery, SearchEventsQuery};
use events_query_handlers::EventQueryHandlers;
use query_cache::{CancellationToken, QueryCache};

use crate::{cli::Commands, render};

/// Query and command handlers sharing one cache, plus the token that aborts
/// whatever is in flight.
pub struct App {
    queries: EventQueryHandlers,
    commands: EventCommandHandlers,
    cancel: CancellationToken,
}

impl App {
    pub fn new(cache: QueryCache, api: Arc<dyn EventsApi>) -> Self {
        Self {
            queries: EventQueryHandlers::new(cache.clone(), api.clone()),
            commands: EventCommandHandlers::new(cache, api),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken { self.cancel.clone() }

    /// Run one command and return what to print.
    pub async fn run(&self, command: Commands) -> RequestResult<String> {
        let cancel = Some(&self.cancel);
        match command {
            Commands::List { max } => {
                let result =
                    self.queries.recent_events(&RecentEventsQuery { max }, cancel).await?;
                Ok(render::events(&result.into_data().unwrap_or_default()))
            }
            Commands::Search { term, max } => {
                let query = SearchEventsQuery {
                    term: Some(term),
                    max,
                };
                let result = self.queries.search_events(&query, cancel).await?;
                Ok(render::events(&result.into_data().unwrap_or_default()))
            }
            Commands::Show { id } => {
                let event = self
                    .queries
                    .load_event(&GetEventQuery { event_id: id }, cancel)
                    .await?;
                Ok(render::event(&event))
            }
            Commands::Images => {
                let result = self.queries.list_images(cancel).await?;
                Ok(render::images(&result.into_data().unwrap_or_default()))
            }
            Commands::Create(args) => {
                let command = CreateEventCommand { event: args.into() };
                let event = self.commands.create_event(command, &self.cancel).await?;
                Ok(format!("Created event {}\n{}", event.id, render::event(&event)))
            }
            Commands::Edit { id, fields } => {
                let current = self
                    .queries
                    .load_event(&GetEventQuery { event_id: id.clone() }, cancel)
                    .await?;
                let command = UpdateEventCommand {
                    event: fields.apply(&current),
                    event_id: id,
                };
                let event = self.commands.update_event(command, &self.cancel).await?;
                Ok(format!("Updated event {}\n{}", event.id, render::event(&event)))
            }
            Commands::Delete { id } => {
                self.commands
                    .delete_event(DeleteEventCommand { event_id: id.clone() }, &self.cancel)
                    .await?;
                Ok(format!("Deleted event {}", id))
            }
        }
    }
}
