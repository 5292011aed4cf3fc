//! In-memory endpoint repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use domain::models::{Endpoint, EndpointSecret, EndpointStatus};
use domain::repositories::EndpointRepository;
use domain::StoreError;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::{record_collection_size, StoreTimer};

/// Repository for endpoints, keyed by endpoint id.
#[derive(Default)]
pub struct InMemoryEndpointRepository {
    endpoints: RwLock<HashMap<Uuid, Endpoint>>,
}

impl InMemoryEndpointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, endpoint: Endpoint) {
        let mut endpoints = self.endpoints.write().await;
        endpoints.insert(endpoint.id, endpoint);
        record_collection_size("endpoints", endpoints.len());
    }

    async fn modify<F>(&self, project_id: Uuid, id: Uuid, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Endpoint) + Send,
    {
        let mut endpoints = self.endpoints.write().await;
        let endpoint = endpoints
            .get_mut(&id)
            .filter(|e| e.project_id == project_id)
            .ok_or_else(|| StoreError::Conflict(format!("endpoint {} does not exist", id)))?;
        apply(endpoint);
        endpoint.updated_at = Utc::now();
        Ok(())
    }

    fn sorted(mut endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        endpoints.sort_by_key(|e| (e.created_at, e.id));
        endpoints
    }
}

#[async_trait]
impl EndpointRepository for InMemoryEndpointRepository {
    async fn find_by_id(&self, project_id: Uuid, id: Uuid) -> Result<Option<Endpoint>, StoreError> {
        let timer = StoreTimer::new("find_endpoint_by_id");
        let endpoint = self
            .endpoints
            .read()
            .await
            .get(&id)
            .filter(|e| e.project_id == project_id)
            .cloned();
        timer.record();
        Ok(endpoint)
    }

    async fn find_by_owner_id(
        &self,
        project_id: Uuid,
        owner_id: &str,
    ) -> Result<Vec<Endpoint>, StoreError> {
        let timer = StoreTimer::new("find_endpoints_by_owner");
        let endpoints = self
            .endpoints
            .read()
            .await
            .values()
            .filter(|e| e.project_id == project_id && e.owner_id.as_deref() == Some(owner_id))
            .cloned()
            .collect();
        timer.record();
        Ok(Self::sorted(endpoints))
    }

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<Endpoint>, StoreError> {
        let timer = StoreTimer::new("find_endpoints_by_project");
        let endpoints = self
            .endpoints
            .read()
            .await
            .values()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect();
        timer.record();
        Ok(Self::sorted(endpoints))
    }

    async fn update_status(
        &self,
        project_id: Uuid,
        id: Uuid,
        status: EndpointStatus,
    ) -> Result<(), StoreError> {
        let timer = StoreTimer::new("update_endpoint_status");
        let result = self.modify(project_id, id, |e| e.status = status).await;
        timer.record();
        result
    }

    async fn update_secrets(
        &self,
        project_id: Uuid,
        id: Uuid,
        secrets: Vec<EndpointSecret>,
    ) -> Result<(), StoreError> {
        let timer = StoreTimer::new("update_endpoint_secrets");
        let result = self.modify(project_id, id, |e| e.secrets = secrets).await;
        timer.record();
        result
    }
}
