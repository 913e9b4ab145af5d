//! Factory: build the scheduler lock selected by `Config`.
use std::sync::Arc;

use tracing::info;

use crate::config::{Config, SchedulerLockBackend};
use crate::services::lock::{LockError, LockStore, PgLockStore, SchedulerLock, ValkeyLockStore};

/// Call when registering a scheduled job; `None` means the lock is disabled
/// and the job should run without coordination.
pub async fn build_scheduler_lock(config: &Config) -> Result<Option<SchedulerLock>, LockError> {
    let store: Arc<dyn LockStore> = match &config.scheduler_lock {
        SchedulerLockBackend::Disabled => return Ok(None),
        SchedulerLockBackend::Postgres { database_url } => {
            let store = PgLockStore::connect(database_url).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
        SchedulerLockBackend::Valkey { url } => Arc::new(ValkeyLockStore::new(url).await?),
    };

    let lock = SchedulerLock::new(store, config.lock_policy);
    info!(?lock, "scheduler lock ready");
    Ok(Some(lock))
}
