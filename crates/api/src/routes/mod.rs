//! HTTP route handlers.

pub mod endpoints;
pub mod event_deliveries;
pub mod events;
pub mod health;
