//! In-memory job queue that records every write for inspection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::Job;
use domain::repositories::JobQueue;
use domain::QueueError;
use std::sync::Mutex;
use tracing::debug;

/// A job as it was written, with its routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub task_name: String,
    pub queue_name: String,
    pub job: Job,
    pub enqueued_at: DateTime<Utc>,
}

/// Queue that keeps written jobs in memory until drained by a consumer.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<QueuedJob>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<QueuedJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every job written so far.
    pub fn jobs(&self) -> Vec<QueuedJob> {
        self.lock().clone()
    }

    pub fn jobs_on(&self, queue_name: &str) -> Vec<QueuedJob> {
        self.lock()
            .iter()
            .filter(|j| j.queue_name == queue_name)
            .cloned()
            .collect()
    }

    /// Removes and returns every queued job.
    pub fn drain(&self) -> Vec<QueuedJob> {
        std::mem::take(&mut *self.lock())
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn write(&self, task_name: &str, queue_name: &str, job: Job) -> Result<(), QueueError> {
        debug!(
            job_id = %job.id,
            task = task_name,
            queue = queue_name,
            delay_ms = job.delay.as_millis() as u64,
            "Job enqueued"
        );
        self.lock().push(QueuedJob {
            task_name: task_name.to_string(),
            queue_name: queue_name.to_string(),
            job,
            enqueued_at: Utc::now(),
        });
        Ok(())
    }
}
