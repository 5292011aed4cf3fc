//! Persistence layer for the hookrelay gateway.
//!
//! This crate contains:
//! - In-memory repository implementations of the domain ports
//! - The per-key token cache and the job queue
//! - Store metrics and fixture seeding

pub mod cache;
pub mod metrics;
pub mod queue;
pub mod repositories;
pub mod seed;
pub mod store;

pub use cache::InMemoryTokenCache;
pub use queue::{InMemoryJobQueue, QueuedJob};
pub use repositories::{
    InMemoryEndpointRepository, InMemoryEventDeliveryRepository, InMemoryEventRepository,
    InMemoryProjectRepository,
};
