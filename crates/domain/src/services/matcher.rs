//! Endpoint matching by event type.

use crate::models::Endpoint;

/// Keeps the endpoints subscribed to `event_type`, literally or via `*`, in input order.
pub fn match_endpoints(event_type: &str, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    endpoints
        .into_iter()
        .filter(|endpoint| endpoint.subscribes_to(event_type))
        .collect()
}
