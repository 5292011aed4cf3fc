//! Queue task records written for the external consumer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::Event;
use crate::error::QueueError;

/// Queue that carries delivery attempts.
pub const EVENT_QUEUE: &str = "EventQueue";
/// Queue that carries event creation and replay.
pub const CREATE_EVENT_QUEUE: &str = "CreateEventQueue";

pub const DELIVERY_PROCESSOR: &str = "EventProcessor";
pub const CREATE_EVENT_PROCESSOR: &str = "CreateEventProcessor";
pub const REPLAY_EVENT_PROCESSOR: &str = "ReplayEventProcessor";

/// A serialized task plus scheduling delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub payload: Vec<u8>,
    pub delay: Duration,
}

impl Job {
    /// Serializes `task` as the JSON payload.
    pub fn new<T: Serialize>(id: impl Into<String>, task: &T, delay: Duration) -> Result<Self, QueueError> {
        let payload =
            serde_json::to_vec(task).map_err(|e| QueueError::Serialization(e.to_string()))?;
        Ok(Self {
            id: id.into(),
            payload,
            delay,
        })
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, QueueError> {
        serde_json::from_slice(&self.payload).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

/// Re-attempt an existing delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub delivery_id: Uuid,
    pub project_id: Uuid,
}

/// Ad-hoc target the consumer upserts as an endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicTarget {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl std::fmt::Debug for DynamicTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicTarget")
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Fan a newly ingested event out into deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEventTask {
    pub event: Event,
    pub create_subscription: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DynamicTarget>,
}

/// Re-submit an existing event through the creation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEventTask {
    pub job_id: String,
    pub event: Event,
}
