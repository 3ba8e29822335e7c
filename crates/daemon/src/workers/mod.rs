//! Background workers and the shared loop driver
//!
//! Each worker is a value exposing a single `run_once` capability; one
//! generic scheduler drives it forever at a fixed interval. Errors are
//! logged and never halt the loop — the next pass is the retry policy.

pub mod expiry;
pub mod reconcile;
pub mod reminder;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use wgfleet_common::Result;

pub use expiry::ExpiryEnforcerWorker;
pub use reconcile::ReconciliationWorker;
pub use reminder::ReminderWorker;

/// One unit of background work
#[async_trait]
pub trait Worker: Send + Sync {
    async fn run_once(&self) -> Result<()>;
}

/// Fixed-cadence schedule for one worker
#[derive(Debug, Clone)]
pub struct Schedule {
    pub name: &'static str,
    pub interval: Duration,
    /// Delay before the first pass, letting dependent connections settle
    pub startup_delay: Duration,
}

/// Drive a worker forever. No backoff, no cancellation; termination is
/// process shutdown.
pub async fn run(schedule: Schedule, worker: Arc<dyn Worker>) {
    tokio::time::sleep(schedule.startup_delay).await;
    info!("{} started", schedule.name);

    loop {
        if let Err(e) = worker.run_once().await {
            error!("{} iteration failed: {}", schedule.name, e);
        }

        tokio::time::sleep(schedule.interval).await;
    }
}
