//! Background job scheduler and job implementations.

mod scheduler;
mod stuck_delivery_sweep;
mod token_cache_purge;

pub use scheduler::{Job, JobFrequency, JobScheduler};
pub use stuck_delivery_sweep::StuckDeliverySweepJob;
pub use token_cache_purge::TokenCachePurgeJob;
