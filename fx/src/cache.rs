//! Rate cache adapter over a pluggable key-value store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FxError, FxResult};
use crate::store::KeyValueStore;

/// Prefix of every rate snapshot key.
pub const CACHE_PREFIX: &str = "exchange_rate";

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// Upper bound for any single backend call.
    pub op_timeout: Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(5),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub connected: bool,
    pub memory_used: String,
    pub client_count: u64,
    pub command_count: u64,
    pub total_keys: u64,
    pub cached_rates: u64,
}

/// Cache adapter with an explicit connect/disconnect lifecycle.
///
/// While no store is attached, or when the store fails or times out,
/// reads and writes report [`FxError::CacheUnavailable`].
pub struct RateCache {
    store: RwLock<Option<Arc<dyn KeyValueStore>>>,
    config: RateCacheConfig,
}

impl RateCache {
    /// Create a detached cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(RateCacheConfig::default())
    }

    /// Create a detached cache with custom configuration.
    pub fn with_config(config: RateCacheConfig) -> Self {
        Self {
            store: RwLock::new(None),
            config,
        }
    }

    /// Attach a store after checking it answers.
    pub async fn connect(&self, store: Arc<dyn KeyValueStore>) -> FxResult<()> {
        self.bounded(store.ping()).await?;
        info!(backend = store.name(), "Cache connected");
        *self.store.write() = Some(store);
        Ok(())
    }

    /// Detach and close the current store.
    pub async fn disconnect(&self) {
        let store = self.store.write().take();
        if let Some(store) = store {
            if let Err(e) = store.close().await {
                warn!(error = %e, "Error closing cache backend");
            }
            info!(backend = store.name(), "Cache disconnected");
        }
    }

    /// Check if a store is attached.
    pub fn is_attached(&self) -> bool {
        self.store.read().is_some()
    }

    /// Check if the attached store answers a ping.
    pub async fn is_connected(&self) -> bool {
        match self.attached() {
            Ok(store) => self.bounded(store.ping()).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Read and decode a value.
    ///
    /// Values that fail to decode are evicted and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> FxResult<Option<T>> {
        let store = self.attached()?;
        let raw = match self.bounded(store.get(key)).await? {
            Some(raw) => raw,
            None => {
                debug!(key, "Cache miss");
                return Ok(None);
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key, error = %e, "Undecodable cache entry evicted");
                let _ = self.bounded(store.delete(key)).await;
                Ok(None)
            }
        }
    }

    /// Encode and write a value with expiry.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> FxResult<()> {
        let store = self.attached()?;
        let raw = serde_json::to_string(value)?;
        self.bounded(store.set_ex(key, raw, ttl)).await?;
        debug!(key, ttl_secs = ttl.as_secs(), "Cache set");
        Ok(())
    }

    /// Remove every entry. A detached cache has nothing to clear.
    pub async fn delete_all(&self) -> FxResult<()> {
        let store = match self.attached() {
            Ok(store) => store,
            Err(_) => {
                warn!("Cache not connected, nothing to clear");
                return Ok(());
            }
        };
        self.bounded(store.flush()).await?;
        info!("Cache cleared");
        Ok(())
    }

    /// Get cache statistics. Never fails; a broken backend reports disconnected.
    pub async fn stats(&self) -> CacheStats {
        let store = match self.attached() {
            Ok(store) => store,
            Err(_) => return CacheStats::default(),
        };

        let info = match self.bounded(store.info()).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Failed to read cache stats");
                return CacheStats::default();
            }
        };
        let prefix = format!("{}:", CACHE_PREFIX);
        let cached_rates = self.bounded(store.count_prefix(&prefix)).await.unwrap_or(0);

        CacheStats {
            connected: true,
            memory_used: human_bytes(info.memory_used_bytes),
            client_count: info.client_count,
            command_count: info.command_count,
            total_keys: info.total_keys,
            cached_rates,
        }
    }

    fn attached(&self) -> FxResult<Arc<dyn KeyValueStore>> {
        self.store
            .read()
            .clone()
            .ok_or_else(|| FxError::CacheUnavailable("not connected".to_string()))
    }

    async fn bounded<T>(&self, op: impl Future<Output = FxResult<T>>) -> FxResult<T> {
        match tokio::time::timeout(self.config.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(FxError::CacheUnavailable(format!(
                "operation timed out after {}ms",
                self.config.op_timeout.as_millis()
            ))),
        }
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a byte count the way Redis reports `used_memory_human`.
fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "K", "M", "G"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.2}{}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn connected_cache() -> (RateCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = RateCache::new();
        cache.connect(store.clone()).await.unwrap();
        (cache, store)
    }

    #[tokio::test]
    async fn test_cache_set_and_get() {
        let (cache, _) = connected_cache().await;
        cache
            .set("exchange_rate:USD:1", &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();

        let cached: Option<Vec<i32>> = cache.get("exchange_rate:USD:1").await.unwrap();
        assert_eq!(cached, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _) = connected_cache().await;
        let cached: Option<String> = cache.get("nothing").await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_detached_cache_is_unavailable() {
        let cache = RateCache::new();
        assert!(!cache.is_connected().await);

        let result: FxResult<Option<String>> = cache.get("k").await;
        assert!(matches!(result, Err(FxError::CacheUnavailable(_))));
        assert!(cache.set("k", &1, Duration::from_secs(1)).await.is_err());

        // Clearing a detached cache is a no-op.
        assert!(cache.delete_all().await.is_ok());
        assert_eq!(cache.stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_lost_connectivity_is_unavailable() {
        let (cache, store) = connected_cache().await;
        store.set_reachable(false);

        let result: FxResult<Option<String>> = cache.get("k").await;
        assert!(result.unwrap_err().is_cache_error());
        assert!(!cache.is_connected().await);
        assert!(!cache.stats().await.connected);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_evicted() {
        let (cache, store) = connected_cache().await;
        store
            .set_ex("k", "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let cached: Option<Vec<i32>> = cache.get("k").await.unwrap();
        assert!(cached.is_none());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_clear_and_stats() {
        let (cache, _) = connected_cache().await;
        let ttl = Duration::from_secs(60);
        cache.set("exchange_rate:USD:1", &1, ttl).await.unwrap();
        cache.set("exchange_rate:EUR:1", &2, ttl).await.unwrap();

        let stats = cache.stats().await;
        assert!(stats.connected);
        assert_eq!(stats.cached_rates, 2);
        assert_eq!(stats.total_keys, 2);

        cache.delete_all().await.unwrap();
        cache.delete_all().await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.total_keys, 0);
        assert_eq!(stats.cached_rates, 0);
    }

    #[tokio::test]
    async fn test_disconnect_detaches() {
        let (cache, _) = connected_cache().await;
        assert!(cache.is_attached());

        cache.disconnect().await;

        assert!(!cache.is_attached());
        assert!(!cache.is_connected().await);
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512B");
        assert_eq!(human_bytes(2048), "2.00K");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00M");
    }
}
