//! hookrelay API: the HTTP surface, orchestration services and background jobs
//! of the webhook delivery gateway.

pub mod app;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod services;
