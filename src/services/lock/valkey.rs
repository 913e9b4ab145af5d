use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::services::cache::{CacheClient, ValkeyClient};
use crate::services::lock::{LockError, LockStore};

/// Valkey-backed lock: the key holds the owner and expires after `hold_for`.
#[derive(Clone, Debug)]
pub struct ValkeyLockStore<C: CacheClient> {
    cache: Arc<C>,
    // Key prefix to avoid collisions across environments
    prefix: String,
}

impl ValkeyLockStore<ValkeyClient> {
    pub async fn new(valkey_url: &str) -> Result<Self, LockError> {
        let client = ValkeyClient::new(valkey_url).await?;
        Ok(Self::new_with_cache(Arc::new(client), "scheduler:lock"))
    }
}

impl<C: CacheClient> ValkeyLockStore<C> {
    pub fn new_with_cache(cache: Arc<C>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }
}

#[async_trait]
impl<C: CacheClient> LockStore for ValkeyLockStore<C> {
    fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        hold_for: Duration,
    ) -> Result<bool, LockError> {
        let acquired = self
            .cache
            .set_if_absent_with_ttl(&self.key(name), owner, hold_for)
            .await?;
        Ok(acquired)
    }

    async fn release(&self, name: &str, owner: &str) -> Result<(), LockError> {
        self.cache.del_if_equals(&self.key(name), owner).await?;
        Ok(())
    }
}
