use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use common_errors::{RequestError, RequestResult};
use events_commands::validate_event_id;
use events_http::EventsApi;
use events_models::{Event, EventImage, EventInput};
use events_queries::EventFilter;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListEvents,
    GetEvent,
    ListImages,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
}

/// Holds requests until released. Requests still honour cancellation while
/// held.
#[derive(Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    /// Let `n` held requests through.
    pub fn release(&self, n: usize) { self.0.add_permits(n); }
}

/// In-memory [`EventsApi`] with call counting, failure injection and
/// request gating.
#[derive(Clone, Default)]
pub struct FakeEventsApi {
    inner: Arc<FakeState>,
}

#[derive(Default)]
struct FakeState {
    events: Mutex<Vec<Event>>,
    images: Mutex<Vec<EventImage>>,
    failures: Mutex<HashMap<Operation, RequestError>>,
    calls: Mutex<HashMap<Operation, usize>>,
    gates: Mutex<HashMap<Operation, Gate>>,
    next_id: AtomicU64,
}

impl FakeEventsApi {
    pub fn new() -> Self { Self::default() }

    pub fn with_events(self, events: Vec<Event>) -> Self {
        *self.inner.events.lock() = events;
        self
    }

    pub fn with_images(self, images: Vec<EventImage>) -> Self {
        *self.inner.images.lock() = images;
        self
    }

    /// Every later call to `operation` fails with `err`.
    pub fn fail(&self, operation: Operation, err: RequestError) {
        self.inner.failures.lock().insert(operation, err);
    }

    pub fn clear_failure(&self, operation: Operation) {
        self.inner.failures.lock().remove(&operation);
    }

    /// Hold calls to `operation` until the returned gate releases them.
    pub fn hold(&self, operation: Operation) -> Gate {
        let gate = Gate(Arc::new(Semaphore::new(0)));
        self.inner.gates.lock().insert(operation, gate.clone());
        gate
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.inner
            .calls
            .lock()
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn events(&self) -> Vec<Event> { self.inner.events.lock().clone() }

    /// Count the call, wait at the gate, then apply any injected failure.
    async fn enter(
        &self, operation: Operation, cancel: &CancellationToken,
    ) -> RequestResult<()> {
        *self.inner.calls.lock().entry(operation).or_default() += 1;
        debug!(?operation, "Fake API call");

        let gate = self.inner.gates.lock().get(&operation).cloned();
        if let Some(Gate(semaphore)) = gate {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                permit = semaphore.acquire() => {
                    permit
                        .map_err(|err| RequestError::Transport(err.to_string()))?
                        .forget();
                }
            }
        }
        if cancel.is_cancelled() {
            return Err(RequestError::Cancelled);
        }

        match self.inner.failures.lock().get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn not_found() -> RequestError {
        RequestError::request_failed(404, Some("Event not found.".to_string()))
    }
}

fn matches_search(event: &Event, term: &str) -> bool {
    let term = term.to_lowercase();
    [&event.title, &event.description, &event.location]
        .iter()
        .any(|field| field.to_lowercase().contains(&term))
}

#[async_trait]
impl EventsApi for FakeEventsApi {
    async fn list_events(
        &self, filter: &EventFilter, cancel: &CancellationToken,
    ) -> RequestResult<Vec<Event>> {
        self.enter(Operation::ListEvents, cancel).await?;
        let events = self.inner.events.lock();
        let matching = events.iter().filter(|event| {
            match filter.search.as_deref().filter(|term| !term.is_empty()) {
                Some(term) => matches_search(event, term),
                None => true,
            }
        });
        Ok(match filter.max {
            Some(max) => matching.take(max as usize).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn get_event(
        &self, id: &str, cancel: &CancellationToken,
    ) -> RequestResult<Event> {
        validate_event_id(id)?;
        self.enter(Operation::GetEvent, cancel).await?;
        self.inner
            .events
            .lock()
            .iter()
            .find(|event| event.id == id)
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn list_images(
        &self, cancel: &CancellationToken,
    ) -> RequestResult<Vec<EventImage>> {
        self.enter(Operation::ListImages, cancel).await?;
        Ok(self.inner.images.lock().clone())
    }

    async fn create_event(
        &self, input: &EventInput, cancel: &CancellationToken,
    ) -> RequestResult<Event> {
        self.enter(Operation::CreateEvent, cancel).await?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let event = Event::from_input(format!("new-{}", id), input.clone());
        self.inner.events.lock().insert(0, event.clone());
        Ok(event)
    }

    async fn update_event(
        &self, id: &str, input: &EventInput, cancel: &CancellationToken,
    ) -> RequestResult<Event> {
        validate_event_id(id)?;
        self.enter(Operation::UpdateEvent, cancel).await?;
        let mut events = self.inner.events.lock();
        let slot = events
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or_else(Self::not_found)?;
        *slot = Event::from_input(id, input.clone());
        Ok(slot.clone())
    }

    async fn delete_event(
        &self, id: &str, cancel: &CancellationToken,
    ) -> RequestResult<()> {
        validate_event_id(id)?;
        self.enter(Operation::DeleteEvent, cancel).await?;
        let mut events = self.inner.events.lock();
        let before = events.len();
        events.retain(|event| event.id != id);
        if events.len() == before {
            return Err(Self::not_found());
        }
        Ok(())
    }
}
