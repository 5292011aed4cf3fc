//! Endpoint lifecycle handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::EndpointResponse;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize, Validate)]
pub struct ExpireSecretRequest {
    /// Hours the current secret keeps verifying.
    #[validate(range(max = 72, message = "Expiration must be at most 72 hours"))]
    pub expiration: u32,

    #[serde(default)]
    #[validate(length(min = 8, max = 256, message = "Secret must be 8-256 characters"))]
    pub secret: Option<String>,
}

/// Toggle an endpoint between active and paused.
///
/// PUT /api/v1/projects/:project_id/endpoints/:endpoint_id/pause
pub async fn pause_endpoint(
    State(state): State<AppState>,
    Path((project_id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<EndpointResponse>, ApiError> {
    let ctx = state.request_context();
    let endpoint = state
        .lifecycle
        .toggle_pause(&ctx, project_id, endpoint_id)
        .await?;
    Ok(Json(endpoint.into()))
}

/// Activate a pending endpoint.
///
/// PUT /api/v1/projects/:project_id/endpoints/:endpoint_id/activate
pub async fn activate_endpoint(
    State(state): State<AppState>,
    Path((project_id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<EndpointResponse>, ApiError> {
    let ctx = state.request_context();
    let endpoint = state
        .lifecycle
        .activate(&ctx, project_id, endpoint_id)
        .await?;
    Ok(Json(endpoint.into()))
}

/// Deactivate an active endpoint.
///
/// PUT /api/v1/projects/:project_id/endpoints/:endpoint_id/deactivate
pub async fn deactivate_endpoint(
    State(state): State<AppState>,
    Path((project_id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<EndpointResponse>, ApiError> {
    let ctx = state.request_context();
    let endpoint = state
        .lifecycle
        .deactivate(&ctx, project_id, endpoint_id)
        .await?;
    Ok(Json(endpoint.into()))
}

/// Rotate the endpoint signing secret.
///
/// PUT /api/v1/projects/:project_id/endpoints/:endpoint_id/expire_secret
pub async fn expire_secret(
    State(state): State<AppState>,
    Path((project_id, endpoint_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<ExpireSecretRequest>,
) -> Result<Json<EndpointResponse>, ApiError> {
    request.validate()?;
    let ctx = state.request_context();
    let endpoint = state
        .lifecycle
        .expire_secret(&ctx, project_id, endpoint_id, request.expiration, request.secret)
        .await?;
    Ok(Json(endpoint.into()))
}
