//! Event ingestion: direct, fan-out, dynamic and broadcast.
//!
//! Each path validates the request, resolves target endpoints, stores the event and
//! enqueues a creation task for the consumer.

use std::sync::Arc;
use std::time::Duration;

use domain::models::task::{CREATE_EVENT_PROCESSOR, CREATE_EVENT_QUEUE};
use domain::models::{
    BroadcastEventRequest, CreateEventRequest, CreateEventTask, DynamicEventRequest, DynamicTarget,
    Event, FanoutEventRequest, Job, Project,
};
use domain::repositories::{EndpointRepository, EventRepository, JobQueue, ProjectRepository};
use domain::services::match_endpoints;
use domain::{GatewayError, RequestContext};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

/// What to do when the event is stored but its creation task cannot be enqueued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueFailurePolicy {
    /// Return the queue error to the caller.
    #[default]
    Propagate,
    /// Log it and report the event as accepted but not enqueued.
    LogAndContinue,
}

#[derive(Debug, Clone, Default)]
pub struct IngestorConfig {
    pub enqueue_failure_policy: EnqueueFailurePolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub event: Event,
    pub enqueued: bool,
}

/// Fields shared by every ingestion request.
struct EventDraft {
    event_type: String,
    data: serde_json::Value,
    custom_headers: Option<HashMap<String, String>>,
    idempotency_key: Option<String>,
}

pub struct EventIngestor {
    projects: Arc<dyn ProjectRepository>,
    events: Arc<dyn EventRepository>,
    endpoints: Arc<dyn EndpointRepository>,
    queue: Arc<dyn JobQueue>,
    config: IngestorConfig,
}

impl EventIngestor {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        events: Arc<dyn EventRepository>,
        endpoints: Arc<dyn EndpointRepository>,
        queue: Arc<dyn JobQueue>,
        config: IngestorConfig,
    ) -> Self {
        Self {
            projects,
            events,
            endpoints,
            queue,
            config,
        }
    }

    /// Sends an event to a single endpoint of the project.
    pub async fn create_event(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        request: CreateEventRequest,
    ) -> Result<IngestOutcome, GatewayError> {
        request.validate()?;
        let project = self.load_project(ctx, project_id).await?;

        let endpoint = ctx
            .run(
                "load endpoint",
                self.endpoints.find_by_id(project.id, request.endpoint_id),
            )
            .await?
            .ok_or_else(|| GatewayError::not_found("endpoint", request.endpoint_id))?;

        let draft = EventDraft {
            event_type: request.event_type,
            data: request.data,
            custom_headers: request.custom_headers,
            idempotency_key: request.idempotency_key,
        };
        self.ingest(ctx, "direct", &project, draft, vec![endpoint.id], true, None)
            .await
    }

    /// Sends an event to every endpoint of `owner_id` subscribed to its type.
    pub async fn create_fanout_event(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        request: FanoutEventRequest,
    ) -> Result<IngestOutcome, GatewayError> {
        request.validate()?;
        let project = self.load_project(ctx, project_id).await?;

        let owned = ctx
            .run(
                "load owner endpoints",
                self.endpoints.find_by_owner_id(project.id, &request.owner_id),
            )
            .await?;
        let matched = match_endpoints(&request.event_type, owned);
        if matched.is_empty() {
            return Err(GatewayError::Validation(format!(
                "no endpoints of owner {} are subscribed to {}",
                request.owner_id, request.event_type
            )));
        }

        let draft = EventDraft {
            event_type: request.event_type,
            data: request.data,
            custom_headers: request.custom_headers,
            idempotency_key: request.idempotency_key,
        };
        let endpoint_ids = matched.iter().map(|e| e.id).collect();
        self.ingest(ctx, "fanout", &project, draft, endpoint_ids, false, None)
            .await
    }

    /// Sends an event to an ad-hoc URL; the consumer creates the endpoint.
    pub async fn create_dynamic_event(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        request: DynamicEventRequest,
    ) -> Result<IngestOutcome, GatewayError> {
        request.validate()?;
        let project = self.load_project(ctx, project_id).await?;

        let target = DynamicTarget {
            url: request.url,
            secret: request.secret,
        };
        let draft = EventDraft {
            event_type: request.event_type,
            data: request.data,
            custom_headers: request.custom_headers,
            idempotency_key: request.idempotency_key,
        };
        self.ingest(ctx, "dynamic", &project, draft, Vec::new(), true, Some(target))
            .await
    }

    /// Sends an event to every subscribed endpoint in the project; no match is fine.
    pub async fn create_broadcast_event(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        request: BroadcastEventRequest,
    ) -> Result<IngestOutcome, GatewayError> {
        request.validate()?;
        let project = self.load_project(ctx, project_id).await?;

        let all = ctx
            .run(
                "load project endpoints",
                self.endpoints.find_by_project(project.id),
            )
            .await?;
        let endpoint_ids = match_endpoints(&request.event_type, all)
            .iter()
            .map(|e| e.id)
            .collect();

        let draft = EventDraft {
            event_type: request.event_type,
            data: request.data,
            custom_headers: request.custom_headers,
            idempotency_key: request.idempotency_key,
        };
        self.ingest(ctx, "broadcast", &project, draft, endpoint_ids, false, None)
            .await
    }

    async fn load_project(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
    ) -> Result<Project, GatewayError> {
        let project = ctx
            .run("load project", self.projects.find_by_id(project_id))
            .await?
            .ok_or_else(|| GatewayError::not_found("project", project_id))?;
        project.retry_config()?;
        Ok(project)
    }

    #[allow(clippy::too_many_arguments)]
    async fn ingest(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        project: &Project,
        draft: EventDraft,
        endpoint_ids: Vec<Uuid>,
        create_subscription: bool,
        target: Option<DynamicTarget>,
    ) -> Result<IngestOutcome, GatewayError> {
        let mut event = Event::new(project.id, draft.event_type, draft.data);
        event.custom_headers = draft.custom_headers;
        event.endpoints = endpoint_ids;

        if let Some(key) = draft.idempotency_key {
            let previous = ctx
                .run(
                    "find events by idempotency key",
                    self.events.find_by_idempotency_key(project.id, &key),
                )
                .await?;
            event.is_duplicate_event = !previous.is_empty();
            event.idempotency_key = Some(key);
        }

        ctx.run("store event", self.events.create(&event)).await?;

        let task = CreateEventTask {
            event: event.clone(),
            create_subscription,
            target,
        };
        let job = Job::new(event.id.to_string(), &task, Duration::ZERO)?;
        let enqueued = match ctx
            .run(
                "enqueue event creation",
                self.queue.write(CREATE_EVENT_PROCESSOR, CREATE_EVENT_QUEUE, job),
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(
                    event_id = %event.id,
                    project_id = %project.id,
                    error = %e,
                    "Event stored but creation task was not enqueued"
                );
                if self.config.enqueue_failure_policy == EnqueueFailurePolicy::Propagate {
                    return Err(e);
                }
                false
            }
        };

        counter!("events_ingested_total", "kind" => kind).increment(1);
        info!(
            event_id = %event.id,
            project_id = %project.id,
            event_type = %event.event_type,
            kind,
            endpoints = event.endpoints.len(),
            duplicate = event.is_duplicate_event,
            "Event ingested"
        );

        Ok(IngestOutcome { event, enqueued })
    }
}
