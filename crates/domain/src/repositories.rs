//! Ports consumed by the gateway services.
//!
//! Services receive these as constructor-injected `Arc<dyn Trait>` values.

use std::time::Duration;

use async_trait::async_trait;
use shared::pagination::{Page, PageRequest};
use uuid::Uuid;

use crate::error::{CacheError, QueueError, StoreError};
use crate::models::{
    DeliveryFilter, DeliveryStatus, Endpoint, EndpointSecret, EndpointStatus, Event,
    EventDelivery, EventFilter, Job, Project,
};

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn find_by_id(&self, project_id: Uuid, id: Uuid) -> Result<Option<Event>, StoreError>;

    /// Every event in the project carrying `key`.
    async fn find_by_idempotency_key(
        &self,
        project_id: Uuid,
        key: &str,
    ) -> Result<Vec<Event>, StoreError>;

    async fn load_paged(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<Page<Event>, StoreError>;

    async fn create(&self, event: &Event) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EventDeliveryRepository: Send + Sync {
    async fn find_by_id(
        &self,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<EventDelivery>, StoreError>;

    /// Deliveries for the ids that exist; missing ids are simply absent.
    async fn find_by_ids(
        &self,
        project_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<EventDelivery>, StoreError>;

    async fn load_paged(
        &self,
        filter: &DeliveryFilter,
        page: &PageRequest,
    ) -> Result<Page<EventDelivery>, StoreError>;

    async fn update_status(
        &self,
        project_id: Uuid,
        id: Uuid,
        status: DeliveryStatus,
    ) -> Result<(), StoreError>;

    async fn create(&self, delivery: &EventDelivery) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EndpointRepository: Send + Sync {
    async fn find_by_id(&self, project_id: Uuid, id: Uuid) -> Result<Option<Endpoint>, StoreError>;

    async fn find_by_owner_id(
        &self,
        project_id: Uuid,
        owner_id: &str,
    ) -> Result<Vec<Endpoint>, StoreError>;

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<Endpoint>, StoreError>;

    async fn update_status(
        &self,
        project_id: Uuid,
        id: Uuid,
        status: EndpointStatus,
    ) -> Result<(), StoreError>;

    async fn update_secrets(
        &self,
        project_id: Uuid,
        id: Uuid,
        secrets: Vec<EndpointSecret>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, StoreError>;
}

/// String-valued cache with per-entry TTL.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn write(&self, task_name: &str, queue_name: &str, job: Job) -> Result<(), QueueError>;
}
