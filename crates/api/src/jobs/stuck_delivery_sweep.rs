//! Re-enqueues deliveries left in `Scheduled` without a queued job.
//!
//! A delivery is marked `Scheduled` before its job is written, so a failed queue
//! write leaves it stranded. Anything still `Scheduled` past the threshold gets
//! its job written again. The stored status is not touched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::models::{DeliveryFilter, DeliveryStatus};
use domain::repositories::EventDeliveryRepository;
use domain::{GatewayError, RequestContext};
use metrics::counter;
use shared::pagination::PageRequest;
use tracing::{info, warn};

use super::scheduler::{Job, JobFrequency};
use crate::services::DeliveryDispatcher;

pub struct StuckDeliverySweepJob {
    deliveries: Arc<dyn EventDeliveryRepository>,
    dispatcher: Arc<DeliveryDispatcher>,
    threshold: Duration,
    interval_secs: u64,
    batch_size: usize,
}

impl StuckDeliverySweepJob {
    pub fn new(
        deliveries: Arc<dyn EventDeliveryRepository>,
        dispatcher: Arc<DeliveryDispatcher>,
        threshold: Duration,
        interval_secs: u64,
        batch_size: usize,
    ) -> Self {
        Self {
            deliveries,
            dispatcher,
            threshold,
            interval_secs,
            batch_size: batch_size.max(1),
        }
    }

    /// Runs one pass and returns how many deliveries were re-enqueued.
    pub async fn sweep(&self, ctx: &RequestContext) -> Result<usize, GatewayError> {
        let threshold = chrono::Duration::from_std(self.threshold)
            .map_err(|e| GatewayError::Configuration(format!("invalid sweep threshold: {}", e)))?;
        let filter = DeliveryFilter {
            statuses: vec![DeliveryStatus::Scheduled],
            updated_before: Some(Utc::now() - threshold),
            ..Default::default()
        };

        let mut page = PageRequest::first(self.batch_size);
        let mut requeued = 0;
        let mut failed = 0;
        loop {
            let batch = ctx
                .run("load stuck deliveries", self.deliveries.load_paged(&filter, &page))
                .await?;

            for delivery in &batch.items {
                match self.dispatcher.requeue(ctx, delivery).await {
                    Ok(()) => requeued += 1,
                    Err(e) => {
                        failed += 1;
                        warn!(
                            delivery_id = %delivery.id,
                            error = %e,
                            "Failed to re-enqueue stuck delivery"
                        );
                    }
                }
            }

            match batch.next_cursor {
                Some(cursor) => page.cursor = Some(cursor),
                None => break,
            }
        }

        if requeued > 0 || failed > 0 {
            counter!("deliveries_requeued_total").increment(requeued as u64);
            info!(requeued, failed, "Stuck delivery sweep finished");
        }
        Ok(requeued)
    }
}

#[async_trait::async_trait]
impl Job for StuckDeliverySweepJob {
    fn name(&self) -> &'static str {
        "stuck_delivery_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), GatewayError> {
        self.sweep(&RequestContext::background()).await.map(|_| ())
    }
}
