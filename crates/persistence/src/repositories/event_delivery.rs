//! In-memory event delivery repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use domain::models::{DeliveryFilter, DeliveryStatus, EventDelivery};
use domain::repositories::EventDeliveryRepository;
use domain::StoreError;
use shared::pagination::{Page, PageRequest};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::{record_collection_size, StoreTimer};
use crate::store::paginate;

/// Repository for deliveries, keyed by delivery id.
#[derive(Default)]
pub struct InMemoryEventDeliveryRepository {
    deliveries: RwLock<HashMap<Uuid, EventDelivery>>,
}

impl InMemoryEventDeliveryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a delivery as-is, timestamps included.
    pub async fn insert(&self, delivery: EventDelivery) {
        self.deliveries.write().await.insert(delivery.id, delivery);
    }
}

#[async_trait]
impl EventDeliveryRepository for InMemoryEventDeliveryRepository {
    async fn find_by_id(
        &self,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<EventDelivery>, StoreError> {
        let timer = StoreTimer::new("find_delivery_by_id");
        let delivery = self
            .deliveries
            .read()
            .await
            .get(&id)
            .filter(|d| d.project_id == project_id)
            .cloned();
        timer.record();
        Ok(delivery)
    }

    async fn find_by_ids(
        &self,
        project_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<EventDelivery>, StoreError> {
        let timer = StoreTimer::new("find_deliveries_by_ids");
        let deliveries = self.deliveries.read().await;
        let found = ids
            .iter()
            .filter_map(|id| deliveries.get(id))
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect();
        timer.record();
        Ok(found)
    }

    async fn load_paged(
        &self,
        filter: &DeliveryFilter,
        page: &PageRequest,
    ) -> Result<Page<EventDelivery>, StoreError> {
        let timer = StoreTimer::new("load_deliveries_paged");
        let matching: Vec<EventDelivery> = self
            .deliveries
            .read()
            .await
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        let result = paginate(matching, |d| (d.created_at, d.id), page);
        timer.record();
        result
    }

    async fn update_status(
        &self,
        project_id: Uuid,
        id: Uuid,
        status: DeliveryStatus,
    ) -> Result<(), StoreError> {
        let timer = StoreTimer::new("update_delivery_status");
        let mut deliveries = self.deliveries.write().await;
        let delivery = deliveries
            .get_mut(&id)
            .filter(|d| d.project_id == project_id)
            .ok_or_else(|| StoreError::Conflict(format!("event delivery {} does not exist", id)))?;
        delivery.status = status;
        delivery.updated_at = Utc::now();
        timer.record();
        Ok(())
    }

    async fn create(&self, delivery: &EventDelivery) -> Result<(), StoreError> {
        let timer = StoreTimer::new("create_delivery");
        let mut deliveries = self.deliveries.write().await;
        if deliveries.contains_key(&delivery.id) {
            return Err(StoreError::Conflict(format!(
                "event delivery {} already exists",
                delivery.id
            )));
        }
        deliveries.insert(delivery.id, delivery.clone());
        record_collection_size("event_deliveries", deliveries.len());
        timer.record();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{Endpoint, Event, RetryConfig, RetryStrategy};
    use serde_json::json;

    fn delivery(project_id: Uuid) -> EventDelivery {
        let event = Event::new(project_id, "a", json!({}));
        let endpoint = Endpoint::new(project_id, "e", "https://example.com");
        let retry = RetryConfig {
            strategy: RetryStrategy::Linear,
            retry_count: 3,
            interval_seconds: 10,
        };
        EventDelivery::schedule(&event, &endpoint, &retry)
    }

    #[tokio::test]
    async fn test_update_status_touches_updated_at() {
        let repo = InMemoryEventDeliveryRepository::new();
        let project_id = Uuid::new_v4();
        let mut d = delivery(project_id);
        d.updated_at = d.updated_at - chrono::Duration::hours(1);
        repo.insert(d.clone()).await;

        repo.update_status(project_id, d.id, DeliveryStatus::Failure)
            .await
            .unwrap();

        let stored = repo.find_by_id(project_id, d.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Failure);
        assert!(stored.updated_at > d.updated_at);
    }

    #[tokio::test]
    async fn test_update_status_unknown_delivery() {
        let repo = InMemoryEventDeliveryRepository::new();
        let result = repo
            .update_status(Uuid::new_v4(), Uuid::new_v4(), DeliveryStatus::Scheduled)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_find_by_ids_skips_missing_and_foreign() {
        let repo = InMemoryEventDeliveryRepository::new();
        let project_id = Uuid::new_v4();
        let ours = delivery(project_id);
        let theirs = delivery(Uuid::new_v4());
        repo.create(&ours).await.unwrap();
        repo.create(&theirs).await.unwrap();

        let found = repo
            .find_by_ids(project_id, &[ours.id, theirs.id, Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ours.id);
    }

    #[tokio::test]
    async fn test_load_paged_by_status() {
        let repo = InMemoryEventDeliveryRepository::new();
        let project_id = Uuid::new_v4();
        for status in [
            DeliveryStatus::Failure,
            DeliveryStatus::Success,
            DeliveryStatus::Failure,
        ] {
            let mut d = delivery(project_id);
            d.status = status;
            repo.create(&d).await.unwrap();
        }

        let mut filter = DeliveryFilter::for_project(project_id);
        filter.statuses = vec![DeliveryStatus::Failure];
        let page = repo.load_paged(&filter, &PageRequest::first(1)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.has_more());
    }
}
