//! Event domain model and ingestion requests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::validation::{
    validate_custom_headers, validate_event_type, validate_idempotency_key, validate_target_url,
};
use uuid::Uuid;
use validator::Validate;

/// An application event; immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub project_id: Uuid,
    pub event_type: String,
    pub data: serde_json::Value,
    /// Payload exactly as received.
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub is_duplicate_event: bool,
    #[serde(default)]
    pub endpoints: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(project_id: Uuid, event_type: impl Into<String>, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            event_type: event_type.into(),
            raw: data.to_string(),
            data,
            custom_headers: None,
            idempotency_key: None,
            is_duplicate_event: false,
            endpoints: Vec::new(),
            source_id: None,
            acknowledged_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Selects events for batch replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub project_id: Uuid,
    #[serde(default)]
    pub endpoint_ids: Vec<Uuid>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub source_id: Option<Uuid>,
    #[serde(default)]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_to: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn for_project(project_id: Uuid) -> Self {
        Self {
            project_id,
            ..Default::default()
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.project_id == self.project_id
            && (self.endpoint_ids.is_empty()
                || event.endpoints.iter().any(|id| self.endpoint_ids.contains(id)))
            && self.event_type.as_ref().map_or(true, |t| &event.event_type == t)
            && self.source_id.map_or(true, |s| event.source_id == Some(s))
            && self.created_from.map_or(true, |from| event.created_at >= from)
            && self.created_to.map_or(true, |to| event.created_at <= to)
    }
}

/// Request to send an event to one endpoint.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateEventRequest {
    pub endpoint_id: Uuid,

    #[validate(custom(function = "validate_event_type"))]
    pub event_type: String,

    pub data: serde_json::Value,

    #[serde(default)]
    #[validate(custom(function = "validate_custom_headers"))]
    pub custom_headers: Option<HashMap<String, String>>,

    #[serde(default)]
    #[validate(custom(function = "validate_idempotency_key"))]
    pub idempotency_key: Option<String>,
}

/// Request to send an event to every matching endpoint of an owner.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FanoutEventRequest {
    #[validate(length(min = 1, max = 255, message = "Owner ID must be 1-255 characters"))]
    pub owner_id: String,

    #[validate(custom(function = "validate_event_type"))]
    pub event_type: String,

    pub data: serde_json::Value,

    #[serde(default)]
    #[validate(custom(function = "validate_custom_headers"))]
    pub custom_headers: Option<HashMap<String, String>>,

    #[serde(default)]
    #[validate(custom(function = "validate_idempotency_key"))]
    pub idempotency_key: Option<String>,
}

/// Request to send an event to an ad-hoc URL.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DynamicEventRequest {
    #[validate(
        length(max = 2048, message = "URL must be at most 2048 characters"),
        custom(function = "validate_target_url")
    )]
    pub url: String,

    #[serde(default)]
    #[validate(length(min = 8, max = 256, message = "Secret must be 8-256 characters"))]
    pub secret: Option<String>,

    #[validate(custom(function = "validate_event_type"))]
    pub event_type: String,

    pub data: serde_json::Value,

    #[serde(default)]
    #[validate(custom(function = "validate_custom_headers"))]
    pub custom_headers: Option<HashMap<String, String>>,

    #[serde(default)]
    #[validate(custom(function = "validate_idempotency_key"))]
    pub idempotency_key: Option<String>,
}

/// Request to send an event to every subscribed endpoint in the project.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BroadcastEventRequest {
    #[validate(custom(function = "validate_event_type"))]
    pub event_type: String,

    pub data: serde_json::Value,

    #[serde(default)]
    #[validate(custom(function = "validate_custom_headers"))]
    pub custom_headers: Option<HashMap<String, String>>,

    #[serde(default)]
    #[validate(custom(function = "validate_idempotency_key"))]
    pub idempotency_key: Option<String>,
}
