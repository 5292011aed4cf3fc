//! Store metrics collection.
//!
//! Provides functions for recording store operation metrics.

use metrics::{gauge, histogram};
use std::time::Instant;

/// Record store operation duration.
pub fn record_store_duration(operation: &str, duration_secs: f64) {
    histogram!(
        "store_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Record the number of records held by a collection.
pub fn record_collection_size(collection: &'static str, size: usize) {
    gauge!("store_records", "collection" => collection).set(size as f64);
}

/// A helper to time store operations and record metrics.
///
/// Usage:
/// ```ignore
/// let timer = StoreTimer::new("find_delivery_by_id");
/// let result = deliveries.get(&id).cloned();
/// timer.record();
/// result
/// ```
pub struct StoreTimer {
    operation: &'static str,
    start: Instant,
}

impl StoreTimer {
    /// Create a new timer for the given operation name.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration to metrics.
    pub fn record(self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_store_duration(self.operation, duration);
    }
}
