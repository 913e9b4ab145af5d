//! Cross-instance mutual exclusion for scheduled jobs.
//!
//! Every instance runs the same schedule; the lock makes sure only one of them
//! does the work. Acquisition is retried a bounded number of times with a
//! fixed backoff. When the lock cannot be taken, for contention or because the
//! backend is down, the run is skipped with a warning. Scheduled work is never
//! allowed to take the service down.
pub mod factory;
pub mod postgres;
pub mod valkey;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::cache::CacheError;

pub use factory::build_scheduler_lock;
pub use postgres::PgLockStore;
pub use valkey::ValkeyLockStore;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Storage for named, owner-tagged, expiring locks.
#[async_trait]
pub trait LockStore: Send + Sync + 'static {
    fn backend_name(&self) -> &'static str;

    // Take `name` for `owner` until `hold_for` elapses.
    //
    // Returns:
    // - Ok(true)  => acquired
    // - Ok(false) => held by someone else and not yet expired
    // - Err(_)    => backend failure
    async fn try_acquire(&self, name: &str, owner: &str, hold_for: Duration)
    -> Result<bool, LockError>;

    // Release `name` if `owner` still holds it. Releasing a lock that expired
    // or changed hands is a no-op.
    async fn release(&self, name: &str, owner: &str) -> Result<(), LockError>;
}

#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    // Upper bound on how long a crashed holder can block others.
    pub hold_for: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            hold_for: Duration::from_secs(600),
        }
    }
}

#[derive(Clone)]
pub struct SchedulerLock {
    store: Arc<dyn LockStore>,
    owner: String,
    policy: LockPolicy,
}

impl std::fmt::Debug for SchedulerLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerLock")
            .field("backend", &self.store.backend_name())
            .field("owner", &self.owner)
            .field("policy", &self.policy)
            .finish()
    }
}

impl SchedulerLock {
    pub fn new(store: Arc<dyn LockStore>, policy: LockPolicy) -> Self {
        Self {
            store,
            owner: format!("instance-{}", Uuid::new_v4()),
            policy,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Run `job` if this instance wins `name`.
    ///
    /// Returns `None` when the run was skipped.
    pub async fn run_exclusive<F, Fut, T>(&self, name: &str, job: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.acquire(name).await {
            return None;
        }

        debug!(lock = name, owner = %self.owner, "scheduler lock acquired");
        let out = job().await;

        if let Err(err) = self.store.release(name, &self.owner).await {
            // The lock still expires on its own after `hold_for`.
            warn!(lock = name, error = %err, "failed to release scheduler lock");
        }
        Some(out)
    }

    async fn acquire(&self, name: &str) -> bool {
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self
                .store
                .try_acquire(name, &self.owner, self.policy.hold_for)
                .await
            {
                Ok(true) => return true,
                Ok(false) => debug!(lock = name, attempt, "scheduler lock held elsewhere"),
                Err(err) => warn!(
                    lock = name,
                    attempt,
                    backend = self.store.backend_name(),
                    error = %err,
                    "scheduler lock backend failure"
                ),
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }

        info!(lock = name, attempts, "skipping scheduled run: lock not acquired");
        false
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Default)]
    struct MemoryLockStore {
        held: Mutex<HashMap<String, String>>,
        calls: AtomicU32,
        // Number of initial try_acquire calls that report contention.
        busy_for: u32,
        broken: bool,
    }

    #[async_trait]
    impl LockStore for MemoryLockStore {
        fn backend_name(&self) -> &'static str {
            "memory"
        }

        async fn try_acquire(
            &self,
            name: &str,
            owner: &str,
            _hold_for: Duration,
        ) -> Result<bool, LockError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.broken {
                return Err(LockError::Cache(CacheError::BackendConnection(
                    "connection refused".into(),
                )));
            }
            if call <= self.busy_for {
                return Ok(false);
            }
            let mut held = self.held.lock().unwrap();
            if held.contains_key(name) {
                return Ok(false);
            }
            held.insert(name.to_string(), owner.to_string());
            Ok(true)
        }

        async fn release(&self, name: &str, owner: &str) -> Result<(), LockError> {
            let mut held = self.held.lock().unwrap();
            if held.get(name).map(String::as_str) == Some(owner) {
                held.remove(name);
            }
            Ok(())
        }
    }

    fn fast_policy() -> LockPolicy {
        LockPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
            hold_for: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn runs_job_and_releases_lock() {
        let store = Arc::new(MemoryLockStore::default());
        let lock = SchedulerLock::new(store.clone(), fast_policy());

        let out = lock.run_exclusive("nightly", || async { 42 }).await;

        assert_eq!(out, Some(42));
        assert!(store.held.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn contended_lock_skips_after_bounded_attempts() {
        let store = Arc::new(MemoryLockStore::default());
        store
            .held
            .lock()
            .unwrap()
            .insert("nightly".into(), "someone-else".into());
        let lock = SchedulerLock::new(store.clone(), fast_policy());

        let ran = AtomicU32::new(0);
        let out = lock
            .run_exclusive("nightly", || async {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(out.is_none());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        // Someone else's lock is left alone.
        assert_eq!(
            store.held.lock().unwrap().get("nightly").map(String::as_str),
            Some("someone-else")
        );
    }

    #[tokio::test]
    async fn retries_until_the_lock_frees_up() {
        let store = Arc::new(MemoryLockStore {
            busy_for: 2,
            ..MemoryLockStore::default()
        });
        let lock = SchedulerLock::new(store.clone(), fast_policy());

        let out = lock.run_exclusive("hourly", || async { "done" }).await;

        assert_eq!(out, Some("done"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn backend_failure_skips_the_run() {
        let store = Arc::new(MemoryLockStore {
            broken: true,
            ..MemoryLockStore::default()
        });
        let lock = SchedulerLock::new(store.clone(), fast_policy());

        let out = lock.run_exclusive("hourly", || async { "done" }).await;

        assert!(out.is_none());
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }
}
