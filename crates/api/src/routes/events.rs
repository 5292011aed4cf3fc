//! Event ingestion and replay handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use domain::models::{
    BroadcastEventRequest, CreateEventRequest, DynamicEventRequest, Event, EventFilter,
    FanoutEventRequest,
};
use domain::GatewayError;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OptionalIdempotencyKey;
use crate::services::{BatchOutcome, IngestOutcome};

/// Selection for `POST /events/batchreplay`; the project comes from the path.
#[derive(Debug, Default, Deserialize)]
pub struct BatchReplayRequest {
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

impl BatchReplayRequest {
    fn into_filter(self, project_id: Uuid) -> Result<EventFilter, ApiError> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to) {
            if from > to {
                return Err(ApiError::Validation(
                    "created_from must not be after created_to".to_string(),
                ));
            }
        }
        Ok(EventFilter {
            project_id,
            endpoint_ids: self.endpoint_ids,
            event_type: self.event_type,
            source_id: self.source_id,
            created_from: self.created_from,
            created_to: self.created_to,
        })
    }
}

/// Create an event for a single endpoint.
///
/// POST /api/v1/projects/:project_id/events
pub async fn create_event(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    idempotency: OptionalIdempotencyKey,
    Json(mut request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    request.idempotency_key = idempotency.or_body(request.idempotency_key.take());
    let ctx = state.request_context();
    let outcome = state
        .ingestor
        .create_event(&ctx, project_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Create an event for every endpoint of an owner.
///
/// POST /api/v1/projects/:project_id/events/fanout
pub async fn create_fanout_event(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    idempotency: OptionalIdempotencyKey,
    Json(mut request): Json<FanoutEventRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    request.idempotency_key = idempotency.or_body(request.idempotency_key.take());
    let ctx = state.request_context();
    let outcome = state
        .ingestor
        .create_fanout_event(&ctx, project_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Create an event for an ad-hoc URL.
///
/// POST /api/v1/projects/:project_id/events/dynamic
pub async fn create_dynamic_event(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    idempotency: OptionalIdempotencyKey,
    Json(mut request): Json<DynamicEventRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    request.idempotency_key = idempotency.or_body(request.idempotency_key.take());
    let ctx = state.request_context();
    let outcome = state
        .ingestor
        .create_dynamic_event(&ctx, project_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Broadcast an event to every subscribed endpoint of the project.
///
/// POST /api/v1/projects/:project_id/events/broadcast
pub async fn create_broadcast_event(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    idempotency: OptionalIdempotencyKey,
    Json(mut request): Json<BroadcastEventRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    request.idempotency_key = idempotency.or_body(request.idempotency_key.take());
    let ctx = state.request_context();
    let outcome = state
        .ingestor
        .create_broadcast_event(&ctx, project_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Replay a single event.
///
/// PUT /api/v1/projects/:project_id/events/:event_id/replay
pub async fn replay_event(
    State(state): State<AppState>,
    Path((project_id, event_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Event>, ApiError> {
    let ctx = state.request_context();
    let event = ctx
        .run("load event", state.events.find_by_id(project_id, event_id))
        .await?
        .ok_or_else(|| GatewayError::not_found("event", event_id))?;

    let event = state.dispatcher.replay(&ctx, &event).await?;
    Ok(Json(event))
}

/// Replay every event matching a filter.
///
/// POST /api/v1/projects/:project_id/events/batchreplay
pub async fn batch_replay_events(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<BatchReplayRequest>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let filter = request.into_filter(project_id)?;
    let ctx = state.request_context();
    let outcome = state.batch.batch_replay(&ctx, &filter).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_batch_replay_filter_scoped_to_project() {
        let project_id = Uuid::new_v4();
        let request: BatchReplayRequest = serde_json::from_value(serde_json::json!({
            "event_type": "invoice.paid"
        }))
        .unwrap();

        let filter = request.into_filter(project_id).unwrap();
        assert_eq!(filter.project_id, project_id);
        assert_eq!(filter.event_type.as_deref(), Some("invoice.paid"));
        assert!(filter.endpoint_ids.is_empty());
    }

    #[test]
    fn test_batch_replay_rejects_inverted_range() {
        let now = Utc::now();
        let request = BatchReplayRequest {
            created_from: Some(now),
            created_to: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(matches!(
            request.into_filter(Uuid::new_v4()),
            Err(ApiError::Validation(_))
        ));
    }
}
