use std::time::Duration;

use anyhow::Result;
use hookrelay_api::app::{create_app, AppState, InMemoryStores};
use hookrelay_api::config::Config;
use hookrelay_api::jobs::{JobScheduler, StuckDeliverySweepJob, TokenCachePurgeJob};
use hookrelay_api::middleware::{init_metrics, logging::init_logging};
use persistence::seed::SeedData;
use tracing::{info, warn};

const JOB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_logging(&config.logging)?;
    init_metrics()?;

    info!("Starting hookrelay v{}", env!("CARGO_PKG_VERSION"));

    let stores = InMemoryStores::new();
    if let Some(path) = &config.store.seed_file {
        info!(path = %path, "Loading seed data");
        SeedData::from_file(path)?
            .apply(&stores.projects, &stores.endpoints)
            .await;
    }

    let addr = config.socket_addr()?;
    let jobs = config.jobs.clone();
    let state = AppState::build(config, &stores)?;

    let mut scheduler = JobScheduler::new();
    scheduler.register(StuckDeliverySweepJob::new(
        stores.deliveries.clone(),
        state.dispatcher.clone(),
        Duration::from_secs(jobs.stuck_delivery_threshold_secs),
        jobs.sweep_interval_secs,
        jobs.sweep_batch_size,
    ));
    scheduler.register(TokenCachePurgeJob::new(stores.token_cache.clone()));
    scheduler.start();

    let app = create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(JOB_SHUTDOWN_TIMEOUT).await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
