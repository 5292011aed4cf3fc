//! Domain layer for the hookrelay gateway.
//!
//! This crate contains:
//! - Entities and their state machines (Event, EventDelivery, Endpoint, Project)
//! - Queue task records
//! - Repository, cache and queue ports
//! - The error taxonomy and request context
//! - Pure services: endpoint matching and the health gate

pub mod context;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

pub use context::RequestContext;
pub use error::{CacheError, GatewayError, QueueError, StoreError};
