//! Domain models for the gateway.

pub mod endpoint;
pub mod event;
pub mod event_delivery;
pub mod project;
pub mod task;

pub use endpoint::{
    Endpoint, EndpointAuthentication, EndpointResponse, EndpointSecret, EndpointStatus,
    ExpiryTimeUnit, OAuth2Config, OAuth2FieldMapping, OAuth2Grant, SecretSummary,
};
pub use event::{
    BroadcastEventRequest, CreateEventRequest, DynamicEventRequest, Event, EventFilter,
    FanoutEventRequest,
};
pub use event_delivery::{DeliveryFilter, DeliveryMetadata, DeliveryStatus, EventDelivery};
pub use project::{Project, ProjectConfig, ProjectRetrySettings, RetryConfig, RetryStrategy};
pub use task::{CreateEventTask, DeliveryTask, DynamicTarget, Job, ReplayEventTask};
