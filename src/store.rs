//! Wiring a quota policy to the configured window store.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{AppConfig, StoreBackend, StoreConfig};
use crate::error::Result;
use crate::ratelimit::{
    Clock, MemoryWindowStore, QuotaPolicy, RedisWindowStore, SlidingWindowCounter, SystemClock,
    WindowStore,
};

/// How often the in-process store drops expired windows.
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Open the window store named by `config`.
///
/// The in-process store gets a background sweeper, so this must run inside a
/// tokio runtime.
pub async fn open_store(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn WindowStore>> {
    match config.backend {
        StoreBackend::Redis => {
            let store = RedisWindowStore::connect(&config.url).await?;
            info!(url = %config.url, "Using Redis window store");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            let store = Arc::new(MemoryWindowStore::new());
            store.clone().spawn_sweeper(clock, MEMORY_SWEEP_INTERVAL);
            info!("Using in-process window store");
            Ok(store)
        }
    }
}

/// Build a quota policy from the full service configuration.
pub async fn build_policy(config: &AppConfig) -> Result<QuotaPolicy> {
    config.validate()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config.store, clock.clone()).await?;
    let counter = SlidingWindowCounter::with_clock(store, clock);
    Ok(QuotaPolicy::with_rules(counter, config.quota.clone()))
}
