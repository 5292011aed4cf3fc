//! In-memory event repository.

use std::collections::HashMap;

use async_trait::async_trait;
use domain::models::{Event, EventFilter};
use domain::repositories::EventRepository;
use domain::StoreError;
use shared::pagination::{Page, PageRequest};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::{record_collection_size, StoreTimer};
use crate::store::paginate;

/// Repository for events, keyed by event id.
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<HashMap<Uuid, Event>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an event as-is, timestamps included.
    pub async fn insert(&self, event: Event) {
        self.events.write().await.insert(event.id, event);
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn find_by_id(&self, project_id: Uuid, id: Uuid) -> Result<Option<Event>, StoreError> {
        let timer = StoreTimer::new("find_event_by_id");
        let event = self
            .events
            .read()
            .await
            .get(&id)
            .filter(|e| e.project_id == project_id)
            .cloned();
        timer.record();
        Ok(event)
    }

    async fn find_by_idempotency_key(
        &self,
        project_id: Uuid,
        key: &str,
    ) -> Result<Vec<Event>, StoreError> {
        let timer = StoreTimer::new("find_events_by_idempotency_key");
        let events = self
            .events
            .read()
            .await
            .values()
            .filter(|e| e.project_id == project_id && e.idempotency_key.as_deref() == Some(key))
            .cloned()
            .collect();
        timer.record();
        Ok(events)
    }

    async fn load_paged(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<Page<Event>, StoreError> {
        let timer = StoreTimer::new("load_events_paged");
        let matching: Vec<Event> = self
            .events
            .read()
            .await
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        let result = paginate(matching, |e| (e.created_at, e.id), page);
        timer.record();
        result
    }

    async fn create(&self, event: &Event) -> Result<(), StoreError> {
        let timer = StoreTimer::new("create_event");
        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Err(StoreError::Conflict(format!("event {} already exists", event.id)));
        }
        events.insert(event.id, event.clone());
        record_collection_size("events", events.len());
        timer.record();
        Ok(())
    }
}
