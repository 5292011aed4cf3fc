//! Gateway services: ingestion, re-dispatch, endpoint lifecycle and OAuth2 tokens.

pub mod batch;
pub mod dispatcher;
pub mod endpoint_lifecycle;
pub mod ingestor;
pub mod oauth2;

pub use batch::{BatchCoordinator, BatchOutcome};
pub use dispatcher::{DeliveryDispatcher, DispatcherConfig};
pub use endpoint_lifecycle::EndpointLifecycle;
pub use ingestor::{EnqueueFailurePolicy, EventIngestor, IngestOutcome, IngestorConfig};
pub use oauth2::{CachedToken, TokenManager};
