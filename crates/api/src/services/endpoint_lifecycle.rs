//! Operator-driven endpoint state changes and secret rotation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::models::{Endpoint, EndpointSecret, EndpointStatus};
use domain::repositories::EndpointRepository;
use domain::{GatewayError, RequestContext};
use shared::crypto::generate_secret;
use tracing::info;
use uuid::Uuid;

/// Longest grace period an expiring secret may keep verifying signatures.
pub const MAX_SECRET_EXPIRY_HOURS: u32 = 72;

const MIN_SECRET_LENGTH: usize = 8;
const MAX_SECRET_LENGTH: usize = 256;

pub struct EndpointLifecycle {
    endpoints: Arc<dyn EndpointRepository>,
}

impl EndpointLifecycle {
    pub fn new(endpoints: Arc<dyn EndpointRepository>) -> Self {
        Self { endpoints }
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Endpoint, GatewayError> {
        ctx.run("load endpoint", self.endpoints.find_by_id(project_id, endpoint_id))
            .await?
            .ok_or_else(|| GatewayError::not_found("endpoint", endpoint_id))
    }

    /// Flips `Active` and `Paused`; other states cannot be toggled.
    pub async fn toggle_pause(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Endpoint, GatewayError> {
        let endpoint = self.get(ctx, project_id, endpoint_id).await?;
        let next = match endpoint.status {
            EndpointStatus::Active => EndpointStatus::Paused,
            EndpointStatus::Paused => EndpointStatus::Active,
            other => {
                return Err(GatewayError::StateConflict(format!(
                    "only active or paused endpoints can be toggled, endpoint is {}",
                    other
                )))
            }
        };
        self.transition(ctx, endpoint, next).await
    }

    /// Completes re-activation of a `Pending` endpoint.
    pub async fn activate(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Endpoint, GatewayError> {
        let endpoint = self.get(ctx, project_id, endpoint_id).await?;
        self.transition(ctx, endpoint, EndpointStatus::Active).await
    }

    pub async fn deactivate(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Endpoint, GatewayError> {
        let endpoint = self.get(ctx, project_id, endpoint_id).await?;
        self.transition(ctx, endpoint, EndpointStatus::Inactive)
            .await
    }

    /// Rotates the signing secret.
    ///
    /// The current secret keeps working for `expiration_hours`; the new one (generated
    /// when not supplied) becomes current immediately. Already expired secrets are dropped.
    pub async fn expire_secret(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        endpoint_id: Uuid,
        expiration_hours: u32,
        new_secret: Option<String>,
    ) -> Result<Endpoint, GatewayError> {
        if expiration_hours > MAX_SECRET_EXPIRY_HOURS {
            return Err(GatewayError::Validation(format!(
                "expiration must be at most {} hours",
                MAX_SECRET_EXPIRY_HOURS
            )));
        }
        if let Some(secret) = &new_secret {
            if !(MIN_SECRET_LENGTH..=MAX_SECRET_LENGTH).contains(&secret.len()) {
                return Err(GatewayError::Validation(format!(
                    "secret must be {}-{} characters",
                    MIN_SECRET_LENGTH, MAX_SECRET_LENGTH
                )));
            }
        }

        let mut endpoint = self.get(ctx, project_id, endpoint_id).await?;
        let now = Utc::now();
        let expires_at = now + Duration::hours(i64::from(expiration_hours));

        let mut secrets: Vec<EndpointSecret> = endpoint
            .secrets
            .into_iter()
            .filter(|s| !s.is_expired_at(now))
            .map(|mut s| {
                if s.expires_at.is_none() {
                    s.expires_at = Some(expires_at);
                }
                s
            })
            .collect();
        secrets.push(EndpointSecret::new(new_secret.unwrap_or_else(generate_secret)));

        ctx.run(
            "update endpoint secrets",
            self.endpoints
                .update_secrets(project_id, endpoint_id, secrets.clone()),
        )
        .await?;

        info!(
            endpoint_id = %endpoint_id,
            expiration_hours,
            secrets = secrets.len(),
            "Endpoint secret rotated"
        );

        endpoint.secrets = secrets;
        endpoint.updated_at = now;
        Ok(endpoint)
    }

    async fn transition(
        &self,
        ctx: &RequestContext,
        mut endpoint: Endpoint,
        next: EndpointStatus,
    ) -> Result<Endpoint, GatewayError> {
        if !endpoint.status.can_transition_to(next) {
            return Err(GatewayError::StateConflict(format!(
                "endpoint cannot move from {} to {}",
                endpoint.status, next
            )));
        }

        ctx.run(
            "update endpoint status",
            self.endpoints
                .update_status(endpoint.project_id, endpoint.id, next),
        )
        .await?;

        info!(
            endpoint_id = %endpoint.id,
            from = %endpoint.status,
            to = %next,
            "Endpoint status changed"
        );

        endpoint.status = next;
        endpoint.updated_at = Utc::now();
        Ok(endpoint)
    }
}
