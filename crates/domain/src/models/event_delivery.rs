//! Event delivery domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::endpoint::Endpoint;
use super::event::Event;
use super::project::{RetryConfig, RetryStrategy};

/// Delivery lifecycle: `Scheduled → Processing → {Success | Retry | Failure | Discarded}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Scheduled,
    Processing,
    Success,
    Retry,
    Failure,
    Discarded,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Scheduled => "scheduled",
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Retry => "retry",
            DeliveryStatus::Failure => "failure",
            DeliveryStatus::Discarded => "discarded",
        }
    }

    /// Why a manual retry is refused in this state, or `None` if it is allowed.
    ///
    /// Only `Failure` is retryable. `Discarded` deliveries are replayed instead.
    pub fn retry_rejection(&self) -> Option<&'static str> {
        match self {
            DeliveryStatus::Failure => None,
            DeliveryStatus::Success => Some("event already sent"),
            DeliveryStatus::Scheduled | DeliveryStatus::Processing | DeliveryStatus::Retry => {
                Some("cannot resend event that did not fail previously")
            }
            DeliveryStatus::Discarded => {
                Some("cannot resend a discarded event, replay the event instead")
            }
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(DeliveryStatus::Scheduled),
            "processing" => Ok(DeliveryStatus::Processing),
            "success" => Ok(DeliveryStatus::Success),
            "retry" => Ok(DeliveryStatus::Retry),
            "failure" => Ok(DeliveryStatus::Failure),
            "discarded" => Ok(DeliveryStatus::Discarded),
            _ => Err(format!("Invalid delivery status: {}", s)),
        }
    }
}

/// Attempt bookkeeping, read by the consumer to compute backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMetadata {
    pub num_trials: u32,
    pub retry_limit: u32,
    pub interval_seconds: u64,
    pub strategy: RetryStrategy,
    pub next_send_time: DateTime<Utc>,
}

/// One delivery of an event to one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDelivery {
    pub id: Uuid,
    pub project_id: Uuid,
    pub event_id: Uuid,
    pub endpoint_id: Uuid,
    pub event_type: String,
    pub status: DeliveryStatus,
    pub metadata: DeliveryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventDelivery {
    /// Builds the delivery for `event` to `endpoint`.
    ///
    /// Endpoints that are not `Active` get a `Discarded` delivery that is never attempted.
    pub fn schedule(event: &Event, endpoint: &Endpoint, retry: &RetryConfig) -> Self {
        let now = Utc::now();
        let (status, description) = if endpoint.is_active() {
            (DeliveryStatus::Scheduled, None)
        } else {
            (
                DeliveryStatus::Discarded,
                Some(format!("endpoint is {}", endpoint.status)),
            )
        };

        Self {
            id: Uuid::new_v4(),
            project_id: event.project_id,
            event_id: event.id,
            endpoint_id: endpoint.id,
            event_type: event.event_type.clone(),
            status,
            metadata: DeliveryMetadata {
                num_trials: 0,
                retry_limit: retry.retry_count,
                interval_seconds: retry.interval_seconds,
                strategy: retry.strategy,
                next_send_time: now,
            },
            description,
            created_at: now,
            updated_at: now,
        }
    }

    /// When the next attempt is due under the configured backoff.
    pub fn next_attempt_at(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let retry = RetryConfig {
            strategy: self.metadata.strategy,
            retry_count: self.metadata.retry_limit,
            interval_seconds: self.metadata.interval_seconds,
        };
        let delay = retry.delay_for_attempt(self.metadata.num_trials.max(1));
        from + Duration::seconds(delay.as_secs() as i64)
    }
}

/// Selects deliveries for batch retry and reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryFilter {
    /// `None` scans every project; only the reconciliation sweep does that.
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub event_id: Option<Uuid>,
    #[serde(default)]
    pub endpoint_ids: Vec<Uuid>,
    #[serde(default)]
    pub statuses: Vec<DeliveryStatus>,
    #[serde(default)]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_before: Option<DateTime<Utc>>,
}

impl DeliveryFilter {
    pub fn for_project(project_id: Uuid) -> Self {
        Self {
            project_id: Some(project_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, delivery: &EventDelivery) -> bool {
        self.project_id.map_or(true, |p| delivery.project_id == p)
            && self.event_id.map_or(true, |e| delivery.event_id == e)
            && (self.endpoint_ids.is_empty() || self.endpoint_ids.contains(&delivery.endpoint_id))
            && (self.statuses.is_empty() || self.statuses.contains(&delivery.status))
            && self.created_from.map_or(true, |from| delivery.created_at >= from)
            && self.created_to.map_or(true, |to| delivery.created_at <= to)
            && self.updated_before.map_or(true, |before| delivery.updated_at < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::endpoint::EndpointStatus;
    use serde_json::json;

    fn retry() -> RetryConfig {
        RetryConfig {
            strategy: RetryStrategy::Exponential,
            retry_count: 4,
            interval_seconds: 30,
        }
    }

    #[test]
    fn test_retry_rejection() {
        assert!(DeliveryStatus::Failure.retry_rejection().is_none());
        assert_eq!(
            DeliveryStatus::Success.retry_rejection(),
            Some("event already sent")
        );
        for status in [
            DeliveryStatus::Scheduled,
            DeliveryStatus::Processing,
            DeliveryStatus::Retry,
        ] {
            assert_eq!(
                status.retry_rejection(),
                Some("cannot resend event that did not fail previously")
            );
        }
        assert!(DeliveryStatus::Discarded.retry_rejection().is_some());
    }

    #[test]
    fn test_schedule_active_endpoint() {
        let project_id = Uuid::new_v4();
        let event = Event::new(project_id, "invoice.paid", json!({}));
        let endpoint = Endpoint::new(project_id, "e", "https://example.com");

        let delivery = EventDelivery::schedule(&event, &endpoint, &retry());
        assert_eq!(delivery.status, DeliveryStatus::Scheduled);
        assert_eq!(delivery.event_id, event.id);
        assert_eq!(delivery.endpoint_id, endpoint.id);
        assert_eq!(delivery.metadata.retry_limit, 4);
        assert_eq!(delivery.metadata.strategy, RetryStrategy::Exponential);
    }

    #[test]
    fn test_schedule_inactive_endpoint_is_discarded() {
        let project_id = Uuid::new_v4();
        let event = Event::new(project_id, "invoice.paid", json!({}));
        for status in [
            EndpointStatus::Paused,
            EndpointStatus::Pending,
            EndpointStatus::Inactive,
        ] {
            let mut endpoint = Endpoint::new(project_id, "e", "https://example.com");
            endpoint.status = status;

            let delivery = EventDelivery::schedule(&event, &endpoint, &retry());
            assert_eq!(delivery.status, DeliveryStatus::Discarded);
            assert!(delivery.description.is_some());
        }
    }

    #[test]
    fn test_next_attempt_uses_backoff() {
        let project_id = Uuid::new_v4();
        let event = Event::new(project_id, "a", json!({}));
        let endpoint = Endpoint::new(project_id, "e", "https://example.com");
        let mut delivery = EventDelivery::schedule(&event, &endpoint, &retry());
        delivery.metadata.num_trials = 3;

        let from = Utc::now();
        assert_eq!(delivery.next_attempt_at(from), from + Duration::seconds(120));
    }

    #[test]
    fn test_filter_matches_status_and_age() {
        let project_id = Uuid::new_v4();
        let event = Event::new(project_id, "a", json!({}));
        let endpoint = Endpoint::new(project_id, "e", "https://example.com");
        let delivery = EventDelivery::schedule(&event, &endpoint, &retry());

        let mut filter = DeliveryFilter::for_project(project_id);
        filter.statuses = vec![DeliveryStatus::Failure];
        assert!(!filter.matches(&delivery));

        filter.statuses = vec![DeliveryStatus::Scheduled];
        assert!(filter.matches(&delivery));

        filter.updated_before = Some(delivery.updated_at);
        assert!(!filter.matches(&delivery));

        let sweep = DeliveryFilter {
            statuses: vec![DeliveryStatus::Scheduled],
            ..Default::default()
        };
        assert!(sweep.matches(&delivery));
    }
}
