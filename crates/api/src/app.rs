use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use domain::repositories::{EventDeliveryRepository, EventRepository};
use domain::{GatewayError, RequestContext};
use persistence::{
    InMemoryEndpointRepository, InMemoryEventDeliveryRepository, InMemoryEventRepository,
    InMemoryJobQueue, InMemoryProjectRepository, InMemoryTokenCache,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, require_api_key, trace_id};
use crate::routes::{endpoints, event_deliveries, events, health};
use crate::services::{
    BatchCoordinator, DeliveryDispatcher, EndpointLifecycle, EventIngestor, TokenManager,
};

/// Concrete in-memory backends behind the service ports.
///
/// Kept separately from `AppState` so jobs and tests can reach the concrete types.
#[derive(Clone, Default)]
pub struct InMemoryStores {
    pub projects: Arc<InMemoryProjectRepository>,
    pub events: Arc<InMemoryEventRepository>,
    pub deliveries: Arc<InMemoryEventDeliveryRepository>,
    pub endpoints: Arc<InMemoryEndpointRepository>,
    pub token_cache: Arc<InMemoryTokenCache>,
    pub queue: Arc<InMemoryJobQueue>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub events: Arc<dyn EventRepository>,
    pub deliveries: Arc<dyn EventDeliveryRepository>,
    pub ingestor: Arc<EventIngestor>,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub batch: Arc<BatchCoordinator>,
    pub lifecycle: Arc<EndpointLifecycle>,
    pub tokens: Arc<TokenManager>,
}

impl AppState {
    /// Wires every service over `stores` using the typed configs from `config`.
    pub fn build(config: Config, stores: &InMemoryStores) -> Result<Self, GatewayError> {
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            stores.deliveries.clone(),
            stores.endpoints.clone(),
            stores.queue.clone(),
            config.dispatcher_config(),
        ));

        let batch = Arc::new(BatchCoordinator::new(
            dispatcher.clone(),
            stores.deliveries.clone(),
            stores.events.clone(),
        ));

        let ingestor = Arc::new(EventIngestor::new(
            stores.projects.clone(),
            stores.events.clone(),
            stores.endpoints.clone(),
            stores.queue.clone(),
            config.ingestor_config(),
        ));

        let tokens = Arc::new(TokenManager::new(
            stores.token_cache.clone(),
            config.oauth2_config(),
        )?);

        Ok(Self {
            events: stores.events.clone(),
            deliveries: stores.deliveries.clone(),
            ingestor,
            dispatcher,
            batch,
            lifecycle: Arc::new(EndpointLifecycle::new(stores.endpoints.clone())),
            tokens,
            config: Arc::new(config),
        })
    }

    /// A context bounded by the configured request timeout.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(Duration::from_secs(self.config.server.request_timeout_secs))
    }
}

pub fn create_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    // Project-scoped routes (API key required)
    let project_routes = Router::new()
        .route("/events", post(events::create_event))
        .route("/events/fanout", post(events::create_fanout_event))
        .route("/events/dynamic", post(events::create_dynamic_event))
        .route("/events/broadcast", post(events::create_broadcast_event))
        .route("/events/batchreplay", post(events::batch_replay_events))
        .route("/events/:event_id/replay", put(events::replay_event))
        .route(
            "/eventdeliveries/batchretry",
            post(event_deliveries::batch_retry_deliveries),
        )
        .route(
            "/eventdeliveries/forceresend",
            post(event_deliveries::force_resend_deliveries),
        )
        .route(
            "/eventdeliveries/:delivery_id/resend",
            put(event_deliveries::resend_delivery),
        )
        .route("/endpoints/:endpoint_id/pause", put(endpoints::pause_endpoint))
        .route(
            "/endpoints/:endpoint_id/activate",
            put(endpoints::activate_endpoint),
        )
        .route(
            "/endpoints/:endpoint_id/deactivate",
            put(endpoints::deactivate_endpoint),
        )
        .route(
            "/endpoints/:endpoint_id/expire_secret",
            put(endpoints::expire_secret),
        );

    let protected_routes = Router::new()
        .nest("/api/v1/projects/:project_id", project_routes)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .with_state(state)
}
