//! Common test utilities for integration tests.
//!
//! Builds the full router over fresh in-memory stores so every test runs in isolation.

// Not every integration test uses every helper.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use domain::models::{
    DeliveryStatus, Endpoint, EndpointSecret, EndpointStatus, Event, EventDelivery, Project,
    ProjectRetrySettings,
};
use hookrelay_api::app::{create_app, AppState, InMemoryStores};
use hookrelay_api::config::Config;
use shared::crypto::sha256_hex;
use uuid::Uuid;

pub const TEST_API_KEY: &str = "hr_test_key_0123456789";

/// A running app plus direct handles on its stores.
pub struct TestApp {
    pub state: AppState,
    pub stores: InMemoryStores,
    pub project: Project,
}

impl TestApp {
    /// App with API key auth disabled.
    pub async fn new() -> Self {
        Self::with_config(test_config(&[])).await
    }

    /// App that only accepts `TEST_API_KEY`.
    pub async fn with_api_key() -> Self {
        let mut config = test_config(&[]);
        config.security.api_key_hashes = vec![sha256_hex(TEST_API_KEY)];
        Self::with_config(config).await
    }

    pub async fn with_config(config: Config) -> Self {
        let stores = InMemoryStores::new();
        let project = Project::new(
            "Test Project",
            ProjectRetrySettings {
                strategy: Some("linear".to_string()),
                retry_count: 3,
                duration: 10,
            },
        );
        stores.projects.insert(project.clone()).await;

        let state = AppState::build(config, &stores).expect("app state");
        Self {
            state,
            stores,
            project,
        }
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }

    pub fn project_path(&self, suffix: &str) -> String {
        format!("/api/v1/projects/{}{}", self.project.id, suffix)
    }

    /// Inserts an endpoint with the given status and subscriptions.
    pub async fn add_endpoint(
        &self,
        status: EndpointStatus,
        owner_id: Option<&str>,
        event_types: &[&str],
    ) -> Endpoint {
        let mut endpoint = Endpoint::new(self.project.id, "receiver", "https://example.com/hook");
        endpoint.status = status;
        endpoint.owner_id = owner_id.map(str::to_string);
        if !event_types.is_empty() {
            endpoint.event_types = event_types.iter().map(|t| t.to_string()).collect();
        }
        endpoint.secrets = vec![EndpointSecret::new("initial-signing-secret")];
        self.stores.endpoints.insert(endpoint.clone()).await;
        endpoint
    }

    /// Inserts an event and one delivery to `endpoint` with the given status.
    pub async fn add_delivery(&self, endpoint: &Endpoint, status: DeliveryStatus) -> EventDelivery {
        let event = self.add_event("invoice.paid", vec![endpoint.id]).await;
        let retry = self.project.retry_config().expect("retry config");
        let mut delivery = EventDelivery::schedule(&event, endpoint, &retry);
        delivery.status = status;
        self.stores.deliveries.insert(delivery.clone()).await;
        delivery
    }

    pub async fn add_event(&self, event_type: &str, endpoints: Vec<Uuid>) -> Event {
        let mut event = Event::new(
            self.project.id,
            event_type,
            serde_json::json!({ "id": Uuid::new_v4() }),
        );
        event.endpoints = endpoints;
        event.created_at = Utc::now() - Duration::minutes(1);
        event.updated_at = event.created_at;
        self.stores.events.insert(event.clone()).await;
        event
    }
}

/// Test configuration built from embedded defaults.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    Config::load_for_test(overrides).expect("test config")
}

pub fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn json_request_with_api_key(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    api_key: &str,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-API-Key", api_key)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn json_request_with_idempotency_key(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    key: &str,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("Idempotency-Key", key)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn put_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}
