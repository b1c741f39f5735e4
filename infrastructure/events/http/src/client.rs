use async_trait::async_trait;
use common_errors::{RequestError, RequestResult, ServerErrorBody};
use events_commands::validate_event_id;
use events_models::{
    Event, EventEnvelope, EventImage, EventInput, EventsEnvelope,
    ImagesEnvelope,
};
use events_queries::EventFilter;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::{api::EventsApi, config::HttpConfig};

#[derive(Debug, Error)]
pub enum HttpSetupError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("Base URL cannot carry a path: {0}")]
    CannotBeABase(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`EventsApi`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpEventsApi {
    client: Client,
    base: Url,
}

impl HttpEventsApi {
    pub fn new(config: &HttpConfig) -> Result<Self, HttpSetupError> {
        let base = Url::parse(&config.base_url)?;
        if base.cannot_be_a_base() {
            return Err(HttpSetupError::CannotBeABase(config.base_url.clone()));
        }
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url { &self.base }

    /// Base URL extended by escaped path segments.
    fn endpoint(&self, segments: &[&str]) -> RequestResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RequestError::Validation(format!(
                    "cannot build a path on {}",
                    self.base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send the request, racing it against `cancel`. Dropping the losing
    /// future aborts the connection.
    async fn exchange(
        &self, request: RequestBuilder, cancel: &CancellationToken,
    ) -> RequestResult<Vec<u8>> {
        let send = async {
            let response = request.send().await.map_err(transport)?;
            let status = response.status();
            let body = response.bytes().await.map_err(transport)?;
            if !status.is_success() {
                debug!(status = status.as_u16(), "Request failed");
                return Err(RequestError::request_failed(
                    status.as_u16(),
                    ServerErrorBody::message_from_bytes(&body),
                ));
            }
            Ok(body.to_vec())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RequestError::Cancelled),
            result = send => result,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self, request: RequestBuilder, cancel: &CancellationToken,
    ) -> RequestResult<T> {
        let body = self.exchange(request, cancel).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn transport(err: reqwest::Error) -> RequestError {
    RequestError::Transport(err.to_string())
}

#[async_trait]
impl EventsApi for HttpEventsApi {
    #[instrument(skip(self, cancel), fields(method = "GET", path = "/events"))]
    async fn list_events(
        &self, filter: &EventFilter, cancel: &CancellationToken,
    ) -> RequestResult<Vec<Event>> {
        let mut url = self.endpoint(&["events"])?;
        let pairs = filter.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        let envelope: EventsEnvelope =
            self.execute(self.client.get(url), cancel).await?;
        Ok(envelope.events)
    }

    #[instrument(skip(self, cancel), fields(method = "GET", path = "/events/{id}"))]
    async fn get_event(
        &self, id: &str, cancel: &CancellationToken,
    ) -> RequestResult<Event> {
        validate_event_id(id)?;
        let url = self.endpoint(&["events", id])?;
        self.execute(self.client.get(url), cancel).await
    }

    #[instrument(skip(self, cancel), fields(method = "GET", path = "/events/images"))]
    async fn list_images(
        &self, cancel: &CancellationToken,
    ) -> RequestResult<Vec<EventImage>> {
        let url = self.endpoint(&["events", "images"])?;
        let envelope: ImagesEnvelope =
            self.execute(self.client.get(url), cancel).await?;
        Ok(envelope.images)
    }

    #[instrument(skip(self, input, cancel), fields(method = "POST", path = "/events"))]
    async fn create_event(
        &self, input: &EventInput, cancel: &CancellationToken,
    ) -> RequestResult<Event> {
        let url = self.endpoint(&["events"])?;
        let request = self.client.post(url).json(&EventEnvelope {
            event: input,
        });
        let envelope: EventEnvelope =
            self.execute(request, cancel).await?;
        Ok(envelope.event)
    }

    #[instrument(skip(self, input, cancel), fields(method = "PUT", path = "/events/{id}"))]
    async fn update_event(
        &self, id: &str, input: &EventInput, cancel: &CancellationToken,
    ) -> RequestResult<Event> {
        validate_event_id(id)?;
        let url = self.endpoint(&["events", id])?;
        let request = self.client.put(url).json(&EventEnvelope {
            event: input,
        });
        let envelope: EventEnvelope =
            self.execute(request, cancel).await?;
        Ok(envelope.event)
    }

    #[instrument(skip(self, cancel), fields(method = "DELETE", path = "/events/{id}"))]
    async fn delete_event(
        &self, id: &str, cancel: &CancellationToken,
    ) -> RequestResult<()> {
        validate_event_id(id)?;
        let url = self.endpoint(&["events", id])?;
        self.exchange(self.client.delete(url), cancel).await?;
        Ok(())
    }
}
