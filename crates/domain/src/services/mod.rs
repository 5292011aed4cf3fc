//! Pure domain services.

pub mod health_gate;
pub mod matcher;

pub use health_gate::{authorize_dispatch, DispatchDecision};
pub use matcher::match_endpoints;
