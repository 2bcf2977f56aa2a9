use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Key/value store with expiring entries and named leases, shared by every
/// process serving the same cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Take the lease `name` for `holder` unless someone else holds an unexpired one
    async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Give the lease up, only if `holder` still owns it
    async fn release_lease(&self, name: &str, holder: &str) -> Result<()>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local store. Expiry follows the tokio clock.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Entry>>,
    leases: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut values = self.values.lock().await;
        match values.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.values.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        if leases.get(name).is_some_and(|lease| lease.expires_at > now) {
            return Ok(false);
        }
        leases.insert(
            name.to_string(),
            Entry {
                value: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        let mut leases = self.leases.lock().await;
        if leases.get(name).is_some_and(|lease| lease.value == holder) {
            leases.remove(name);
        }
        Ok(())
    }
}
