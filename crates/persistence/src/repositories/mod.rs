//! Repository implementations.

pub mod endpoint;
pub mod event;
pub mod event_delivery;
pub mod project;

pub use endpoint::InMemoryEndpointRepository;
pub use event::InMemoryEventRepository;
pub use event_delivery::InMemoryEventDeliveryRepository;
pub use project::InMemoryProjectRepository;
