//! Manual re-dispatch of deliveries and events.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::models::task::{
    CREATE_EVENT_QUEUE, DELIVERY_PROCESSOR, EVENT_QUEUE, REPLAY_EVENT_PROCESSOR,
};
use domain::models::{
    DeliveryStatus, DeliveryTask, Endpoint, Event, EventDelivery, Job, ReplayEventTask,
};
use domain::repositories::{EndpointRepository, EventDeliveryRepository, JobQueue};
use domain::services::authorize_dispatch;
use domain::{GatewayError, RequestContext};
use metrics::counter;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Delay applied to retry and force-resend jobs.
    pub retry_debounce: Duration,
    pub batch_page_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry_debounce: Duration::from_secs(1),
            batch_page_size: 100,
        }
    }
}

/// Puts deliveries back on the delivery queue and events back on the creation queue.
pub struct DeliveryDispatcher {
    deliveries: Arc<dyn EventDeliveryRepository>,
    endpoints: Arc<dyn EndpointRepository>,
    queue: Arc<dyn JobQueue>,
    config: DispatcherConfig,
}

impl DeliveryDispatcher {
    pub fn new(
        deliveries: Arc<dyn EventDeliveryRepository>,
        endpoints: Arc<dyn EndpointRepository>,
        queue: Arc<dyn JobQueue>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            deliveries,
            endpoints,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Retries a failed delivery.
    ///
    /// Paused and pending endpoints refuse the retry. An inactive endpoint is moved to
    /// `Pending` so the consumer health-checks it on this attempt.
    pub async fn retry(
        &self,
        ctx: &RequestContext,
        delivery: &EventDelivery,
    ) -> Result<(), GatewayError> {
        if let Some(reason) = delivery.status.retry_rejection() {
            return Err(GatewayError::StateConflict(reason.to_string()));
        }

        let endpoint = self.load_endpoint(ctx, delivery).await?;
        let decision = authorize_dispatch(&endpoint);
        if let Some(reason) = decision.reason() {
            warn!(
                delivery_id = %delivery.id,
                endpoint_id = %endpoint.id,
                endpoint_status = %endpoint.status,
                "Retry refused by endpoint state"
            );
            return Err(GatewayError::StateConflict(reason.to_string()));
        }

        if let Some(next) = decision.transition() {
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
                "Endpoint re-armed for health check"
            );
        }

        self.schedule(ctx, delivery).await?;
        counter!("deliveries_retried_total").increment(1);
        info!(
            delivery_id = %delivery.id,
            project_id = %delivery.project_id,
            "Delivery scheduled for retry"
        );
        Ok(())
    }

    /// Re-sends a delivery regardless of its status; the endpoint must be active.
    pub async fn force_resend(
        &self,
        ctx: &RequestContext,
        delivery: &EventDelivery,
    ) -> Result<(), GatewayError> {
        let endpoint = self.load_endpoint(ctx, delivery).await?;
        if !endpoint.is_active() {
            return Err(GatewayError::StateConflict(format!(
                "force resend requires an active endpoint, endpoint {} is {}",
                endpoint.id, endpoint.status
            )));
        }

        self.schedule(ctx, delivery).await?;
        counter!("deliveries_force_resent_total").increment(1);
        info!(
            delivery_id = %delivery.id,
            project_id = %delivery.project_id,
            "Delivery force resent"
        );
        Ok(())
    }

    /// Re-runs event creation for `event`; returns the event as acknowledged.
    pub async fn replay(&self, ctx: &RequestContext, event: &Event) -> Result<Event, GatewayError> {
        if event.id.is_nil() || event.project_id.is_nil() {
            return Err(GatewayError::Validation(
                "event id and project id are required for replay".into(),
            ));
        }

        let mut event = event.clone();
        event.acknowledged_at = Some(Utc::now());

        let job_id = Uuid::new_v4().to_string();
        let task = ReplayEventTask {
            job_id: job_id.clone(),
            event: event.clone(),
        };
        let job = Job::new(job_id.clone(), &task, Duration::ZERO)?;

        ctx.run(
            "enqueue event replay",
            self.queue.write(REPLAY_EVENT_PROCESSOR, CREATE_EVENT_QUEUE, job),
        )
        .await
        .map_err(|e| {
            error!(event_id = %event.id, error = %e, "Failed to enqueue event replay");
            e
        })?;

        counter!("events_replayed_total").increment(1);
        info!(
            event_id = %event.id,
            project_id = %event.project_id,
            job_id = %job_id,
            "Event replay enqueued"
        );
        Ok(event)
    }

    async fn load_endpoint(
        &self,
        ctx: &RequestContext,
        delivery: &EventDelivery,
    ) -> Result<Endpoint, GatewayError> {
        ctx.run(
            "load endpoint",
            self.endpoints
                .find_by_id(delivery.project_id, delivery.endpoint_id),
        )
        .await?
        .ok_or_else(|| GatewayError::not_found("endpoint", delivery.endpoint_id))
    }

    /// Marks the delivery `Scheduled`, then enqueues it.
    ///
    /// An enqueue failure leaves the delivery `Scheduled` with no job; the stuck
    /// delivery sweep picks it up later.
    async fn schedule(
        &self,
        ctx: &RequestContext,
        delivery: &EventDelivery,
    ) -> Result<(), GatewayError> {
        ctx.run(
            "update delivery status",
            self.deliveries.update_status(
                delivery.project_id,
                delivery.id,
                DeliveryStatus::Scheduled,
            ),
        )
        .await?;

        self.requeue(ctx, delivery).await.map_err(|e| {
            error!(
                delivery_id = %delivery.id,
                error = %e,
                "Delivery marked scheduled but enqueue failed"
            );
            e
        })
    }

    /// Writes the delivery job without touching the stored status.
    pub async fn requeue(
        &self,
        ctx: &RequestContext,
        delivery: &EventDelivery,
    ) -> Result<(), GatewayError> {
        let task = DeliveryTask {
            delivery_id: delivery.id,
            project_id: delivery.project_id,
        };
        let job = Job::new(delivery.id.to_string(), &task, self.config.retry_debounce)?;

        ctx.run(
            "enqueue delivery",
            self.queue.write(DELIVERY_PROCESSOR, EVENT_QUEUE, job),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::models::{EndpointStatus, ProjectRetrySettings, Project};
    use domain::QueueError;
    use persistence::{InMemoryEndpointRepository, InMemoryEventDeliveryRepository, InMemoryJobQueue};
    use serde_json::json;

    struct FailingQueue;

    #[async_trait]
    impl JobQueue for FailingQueue {
        async fn write(&self, _: &str, _: &str, _: Job) -> Result<(), QueueError> {
            Err(QueueError::Write("broker down".into()))
        }
    }

    struct Fixture {
        deliveries: Arc<InMemoryEventDeliveryRepository>,
        endpoints: Arc<InMemoryEndpointRepository>,
        queue: Arc<InMemoryJobQueue>,
        dispatcher: DeliveryDispatcher,
        endpoint: Endpoint,
        event: Event,
    }

    async fn fixture(endpoint_status: EndpointStatus) -> Fixture {
        let project = Project::new(
            "p",
            ProjectRetrySettings {
                strategy: Some("linear".into()),
                retry_count: 3,
                duration: 10,
            },
        );
        let mut endpoint = Endpoint::new(project.id, "e", "https://example.com/hook");
        endpoint.status = endpoint_status;
        let event = Event::new(project.id, "invoice.paid", json!({"id": 1}));

        let deliveries = Arc::new(InMemoryEventDeliveryRepository::new());
        let endpoints = Arc::new(InMemoryEndpointRepository::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        endpoints.insert(endpoint.clone()).await;

        let dispatcher = DeliveryDispatcher::new(
            deliveries.clone(),
            endpoints.clone(),
            queue.clone(),
            DispatcherConfig::default(),
        );

        Fixture {
            deliveries,
            endpoints,
            queue,
            dispatcher,
            endpoint,
            event,
        }
    }

    async fn delivery(f: &Fixture, status: DeliveryStatus) -> EventDelivery {
        let retry = domain::models::RetryConfig {
            strategy: domain::models::RetryStrategy::Linear,
            retry_count: 3,
            interval_seconds: 10,
        };
        let mut active = f.endpoint.clone();
        active.status = EndpointStatus::Active;
        let mut delivery = EventDelivery::schedule(&f.event, &active, &retry);
        delivery.status = status;
        f.deliveries.insert(delivery.clone()).await;
        delivery
    }

    async fn stored_status(f: &Fixture, id: Uuid) -> DeliveryStatus {
        f.deliveries
            .find_by_id(f.event.project_id, id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_retry_failed_delivery() {
        let f = fixture(EndpointStatus::Active).await;
        let d = delivery(&f, DeliveryStatus::Failure).await;

        f.dispatcher
            .retry(&RequestContext::background(), &d)
            .await
            .unwrap();

        assert_eq!(stored_status(&f, d.id).await, DeliveryStatus::Scheduled);
        let jobs = f.queue.jobs_on(EVENT_QUEUE);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].task_name, DELIVERY_PROCESSOR);
        assert_eq!(jobs[0].job.id, d.id.to_string());
        assert_eq!(jobs[0].job.delay, Duration::from_secs(1));
        let task: DeliveryTask = jobs[0].job.decode().unwrap();
        assert_eq!(task.delivery_id, d.id);
    }

    #[tokio::test]
    async fn test_retry_rejects_non_failed_states() {
        let f = fixture(EndpointStatus::Active).await;
        for (status, message) in [
            (DeliveryStatus::Success, "event already sent"),
            (
                DeliveryStatus::Scheduled,
                "cannot resend event that did not fail previously",
            ),
            (
                DeliveryStatus::Processing,
                "cannot resend event that did not fail previously",
            ),
            (
                DeliveryStatus::Retry,
                "cannot resend event that did not fail previously",
            ),
        ] {
            let d = delivery(&f, status).await;
            let err = f
                .dispatcher
                .retry(&RequestContext::background(), &d)
                .await
                .unwrap_err();
            assert!(matches!(&err, GatewayError::StateConflict(m) if m == message));
        }
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn test_retry_refused_for_paused_endpoint() {
        let f = fixture(EndpointStatus::Paused).await;
        let d = delivery(&f, DeliveryStatus::Failure).await;

        let err = f
            .dispatcher
            .retry(&RequestContext::background(), &d)
            .await
            .unwrap_err();
        assert!(matches!(&err, GatewayError::StateConflict(m) if m == "endpoint is currently paused"));
        assert_eq!(stored_status(&f, d.id).await, DeliveryStatus::Failure);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn test_retry_refused_for_pending_endpoint() {
        let f = fixture(EndpointStatus::Pending).await;
        let d = delivery(&f, DeliveryStatus::Failure).await;

        let err = f
            .dispatcher
            .retry(&RequestContext::background(), &d)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, GatewayError::StateConflict(m) if m == "endpoint is being re-activated")
        );
    }

    #[tokio::test]
    async fn test_retry_inactive_endpoint_moves_to_pending() {
        let f = fixture(EndpointStatus::Inactive).await;
        let d = delivery(&f, DeliveryStatus::Failure).await;

        f.dispatcher
            .retry(&RequestContext::background(), &d)
            .await
            .unwrap();

        let endpoint = f
            .endpoints
            .find_by_id(f.endpoint.project_id, f.endpoint.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(endpoint.status, EndpointStatus::Pending);
        assert_eq!(f.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_missing_endpoint_is_not_found() {
        let f = fixture(EndpointStatus::Active).await;
        let mut d = delivery(&f, DeliveryStatus::Failure).await;
        d.endpoint_id = Uuid::new_v4();

        let err = f
            .dispatcher
            .retry(&RequestContext::background(), &d)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { entity: "endpoint", .. }));
    }

    #[tokio::test]
    async fn test_enqueue_failure_leaves_delivery_scheduled() {
        let f = fixture(EndpointStatus::Active).await;
        let d = delivery(&f, DeliveryStatus::Failure).await;
        let dispatcher = DeliveryDispatcher::new(
            f.deliveries.clone(),
            f.endpoints.clone(),
            Arc::new(FailingQueue),
            DispatcherConfig::default(),
        );

        let err = dispatcher
            .retry(&RequestContext::background(), &d)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Dependency(_)));
        assert!(err.is_retryable());
        assert_eq!(stored_status(&f, d.id).await, DeliveryStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_force_resend_any_status_on_active_endpoint() {
        let f = fixture(EndpointStatus::Active).await;
        let d = delivery(&f, DeliveryStatus::Success).await;

        f.dispatcher
            .force_resend(&RequestContext::background(), &d)
            .await
            .unwrap();
        assert_eq!(stored_status(&f, d.id).await, DeliveryStatus::Scheduled);
        assert_eq!(f.queue.jobs_on(EVENT_QUEUE).len(), 1);
    }

    #[tokio::test]
    async fn test_force_resend_requires_active_endpoint() {
        let f = fixture(EndpointStatus::Inactive).await;
        let d = delivery(&f, DeliveryStatus::Success).await;

        let err = f
            .dispatcher
            .force_resend(&RequestContext::background(), &d)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::StateConflict(_)));
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn test_replay_enqueues_creation_task() {
        let f = fixture(EndpointStatus::Active).await;

        let replayed = f
            .dispatcher
            .replay(&RequestContext::background(), &f.event)
            .await
            .unwrap();
        assert!(replayed.acknowledged_at.is_some());

        let jobs = f.queue.jobs_on(CREATE_EVENT_QUEUE);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].task_name, REPLAY_EVENT_PROCESSOR);
        let task: ReplayEventTask = jobs[0].job.decode().unwrap();
        assert_eq!(task.job_id, jobs[0].job.id);
        assert_eq!(task.event.id, f.event.id);
        assert!(task.event.acknowledged_at.is_some());
    }

    #[tokio::test]
    async fn test_replay_rejects_nil_ids() {
        let f = fixture(EndpointStatus::Active).await;
        let mut event = f.event.clone();
        event.id = Uuid::nil();

        let err = f
            .dispatcher
            .replay(&RequestContext::background(), &event)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_before_writes() {
        let f = fixture(EndpointStatus::Active).await;
        let d = delivery(&f, DeliveryStatus::Failure).await;
        let ctx = RequestContext::background();
        ctx.cancel();

        let err = f.dispatcher.retry(&ctx, &d).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
        assert_eq!(stored_status(&f, d.id).await, DeliveryStatus::Failure);
    }
}
