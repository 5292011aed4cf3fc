//! Bulk retry, replay and force-resend.
//!
//! Per-item failures are counted rather than propagated; only loading the work set can
//! fail a batch.

use std::collections::HashSet;
use std::sync::Arc;

use domain::models::{DeliveryFilter, DeliveryStatus, Event, EventDelivery, EventFilter};
use domain::repositories::{EventDeliveryRepository, EventRepository};
use domain::{GatewayError, RequestContext};
use metrics::counter;
use serde::Serialize;
use shared::pagination::PageRequest;
use tracing::{info, warn};
use uuid::Uuid;

use super::dispatcher::DeliveryDispatcher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub successes: usize,
    pub failures: usize,
}

impl BatchOutcome {
    fn record(&mut self, operation: &'static str, id: Uuid, result: Result<(), GatewayError>) {
        match result {
            Ok(()) => self.successes += 1,
            Err(e) => {
                self.failures += 1;
                counter!("batch_items_failed_total", "operation" => operation).increment(1);
                warn!(operation, id = %id, code = e.code(), error = %e, "Batch item failed");
            }
        }
    }
}

pub struct BatchCoordinator {
    dispatcher: Arc<DeliveryDispatcher>,
    deliveries: Arc<dyn EventDeliveryRepository>,
    events: Arc<dyn EventRepository>,
}

impl BatchCoordinator {
    pub fn new(
        dispatcher: Arc<DeliveryDispatcher>,
        deliveries: Arc<dyn EventDeliveryRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            dispatcher,
            deliveries,
            events,
        }
    }

    /// Retries every delivery matching `filter`.
    pub async fn batch_retry(
        &self,
        ctx: &RequestContext,
        filter: &DeliveryFilter,
    ) -> Result<BatchOutcome, GatewayError> {
        let deliveries = self.load_deliveries(ctx, filter).await?;

        let mut outcome = BatchOutcome::default();
        for delivery in &deliveries {
            let result = self.dispatcher.retry(ctx, delivery).await;
            outcome.record("retry", delivery.id, result);
        }

        info!(
            matched = deliveries.len(),
            successes = outcome.successes,
            failures = outcome.failures,
            "Batch retry finished"
        );
        Ok(outcome)
    }

    /// Replays every event matching `filter`.
    pub async fn batch_replay(
        &self,
        ctx: &RequestContext,
        filter: &EventFilter,
    ) -> Result<BatchOutcome, GatewayError> {
        let events = self.load_events(ctx, filter).await?;

        let mut outcome = BatchOutcome::default();
        for event in &events {
            let result = self.dispatcher.replay(ctx, event).await.map(|_| ());
            outcome.record("replay", event.id, result);
        }

        info!(
            project_id = %filter.project_id,
            matched = events.len(),
            successes = outcome.successes,
            failures = outcome.failures,
            "Batch replay finished"
        );
        Ok(outcome)
    }

    /// Force-resends the given deliveries.
    ///
    /// All-or-nothing validation: if any id is unknown or any delivery has not
    /// succeeded, nothing is sent.
    pub async fn force_resend(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        ids: &[Uuid],
    ) -> Result<BatchOutcome, GatewayError> {
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if ids.is_empty() {
            return Err(GatewayError::Validation(
                "at least one event delivery id is required".into(),
            ));
        }

        let deliveries = ctx
            .run(
                "load event deliveries",
                self.deliveries.find_by_ids(project_id, &ids),
            )
            .await?;

        let found: HashSet<Uuid> = deliveries.iter().map(|d| d.id).collect();
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains(id))
            .map(Uuid::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(GatewayError::NotFound {
                entity: "event delivery",
                id: missing.join(", "),
            });
        }

        if let Some(delivery) = deliveries
            .iter()
            .find(|d| d.status != DeliveryStatus::Success)
        {
            return Err(GatewayError::StateConflict(format!(
                "only successful deliveries can be force resent, delivery {} is {}",
                delivery.id, delivery.status
            )));
        }

        let mut outcome = BatchOutcome::default();
        for delivery in &deliveries {
            let result = self.dispatcher.force_resend(ctx, delivery).await;
            outcome.record("force_resend", delivery.id, result);
        }

        info!(
            project_id = %project_id,
            successes = outcome.successes,
            failures = outcome.failures,
            "Force resend finished"
        );
        Ok(outcome)
    }

    /// Loads every match up front so status changes cannot shift later pages.
    async fn load_deliveries(
        &self,
        ctx: &RequestContext,
        filter: &DeliveryFilter,
    ) -> Result<Vec<EventDelivery>, GatewayError> {
        let mut page = PageRequest::first(self.dispatcher.config().batch_page_size);
        let mut all = Vec::new();
        loop {
            let batch = ctx
                .run(
                    "load event deliveries",
                    self.deliveries.load_paged(filter, &page),
                )
                .await?;
            all.extend(batch.items);
            match batch.next_cursor {
                Some(cursor) => page.cursor = Some(cursor),
                None => break,
            }
        }
        Ok(all)
    }

    async fn load_events(
        &self,
        ctx: &RequestContext,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, GatewayError> {
        let mut page = PageRequest::first(self.dispatcher.config().batch_page_size);
        let mut all = Vec::new();
        loop {
            let batch = ctx
                .run("load events", self.events.load_paged(filter, &page))
                .await?;
            all.extend(batch.items);
            match batch.next_cursor {
                Some(cursor) => page.cursor = Some(cursor),
                None => break,
            }
        }
        Ok(all)
    }
}
