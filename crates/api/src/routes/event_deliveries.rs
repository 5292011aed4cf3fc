//! Event delivery re-dispatch handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use domain::models::{DeliveryFilter, DeliveryStatus, EventDelivery};
use domain::GatewayError;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::BatchOutcome;

/// Selection for `POST /eventdeliveries/batchretry`.
///
/// With no `statuses`, only failed deliveries are selected.
#[derive(Debug, Default, Deserialize)]
pub struct BatchRetryRequest {
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
}

impl BatchRetryRequest {
    fn into_filter(self, project_id: Uuid) -> Result<DeliveryFilter, ApiError> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to) {
            if from > to {
                return Err(ApiError::Validation(
                    "created_from must not be after created_to".to_string(),
                ));
            }
        }
        let statuses = if self.statuses.is_empty() {
            vec![DeliveryStatus::Failure]
        } else {
            self.statuses
        };
        Ok(DeliveryFilter {
            project_id: Some(project_id),
            event_id: self.event_id,
            endpoint_ids: self.endpoint_ids,
            statuses,
            created_from: self.created_from,
            created_to: self.created_to,
            updated_before: None,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ForceResendRequest {
    pub ids: Vec<Uuid>,
}

/// Retry one failed delivery.
///
/// PUT /api/v1/projects/:project_id/eventdeliveries/:delivery_id/resend
pub async fn resend_delivery(
    State(state): State<AppState>,
    Path((project_id, delivery_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<EventDelivery>, ApiError> {
    let ctx = state.request_context();
    let delivery = load_delivery(&state, &ctx, project_id, delivery_id).await?;

    state.dispatcher.retry(&ctx, &delivery).await?;

    let delivery = load_delivery(&state, &ctx, project_id, delivery_id).await?;
    Ok(Json(delivery))
}

/// Retry every delivery matching a filter.
///
/// POST /api/v1/projects/:project_id/eventdeliveries/batchretry
pub async fn batch_retry_deliveries(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<BatchRetryRequest>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let filter = request.into_filter(project_id)?;
    let ctx = state.request_context();
    let outcome = state.batch.batch_retry(&ctx, &filter).await?;
    Ok(Json(outcome))
}

/// Re-send successful deliveries.
///
/// POST /api/v1/projects/:project_id/eventdeliveries/forceresend
pub async fn force_resend_deliveries(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<ForceResendRequest>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let ctx = state.request_context();
    let outcome = state
        .batch
        .force_resend(&ctx, project_id, &request.ids)
        .await?;
    Ok(Json(outcome))
}

async fn load_delivery(
    state: &AppState,
    ctx: &domain::RequestContext,
    project_id: Uuid,
    delivery_id: Uuid,
) -> Result<EventDelivery, GatewayError> {
    ctx.run(
        "load event delivery",
        state.deliveries.find_by_id(project_id, delivery_id),
    )
    .await?
    .ok_or_else(|| GatewayError::not_found("event delivery", delivery_id))
}
