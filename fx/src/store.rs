//! Key-value store backends with per-key expiry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{FxError, FxResult};

/// Backend counters reported by [`KeyValueStore::info`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreInfo {
    /// Bytes held by the backend.
    pub memory_used_bytes: u64,
    /// Connected clients.
    pub client_count: u64,
    /// Commands processed since start.
    pub command_count: u64,
    /// Live keys.
    pub total_keys: u64,
}

/// Narrow interface over a key-value store with expiry.
///
/// Single-key operations are expected to be atomic; no multi-key
/// transactions are required.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Read a value.
    async fn get(&self, key: &str) -> FxResult<Option<String>>;

    /// Write a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> FxResult<()>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> FxResult<bool>;

    /// Remove every key.
    async fn flush(&self) -> FxResult<()>;

    /// Round-trip check.
    async fn ping(&self) -> FxResult<()>;

    /// Backend counters.
    async fn info(&self) -> FxResult<StoreInfo>;

    /// Count live keys starting with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> FxResult<u64>;

    /// Release the connection.
    async fn close(&self) -> FxResult<()>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process store.
///
/// Expired entries are dropped lazily on read and swept on `info`.
/// Reachability can be switched off to exercise the degraded paths.
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
    reachable: AtomicBool,
    clients: AtomicU64,
    commands: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            reachable: AtomicBool::new(true),
            clients: AtomicU64::new(1),
            commands: AtomicU64::new(0),
        }
    }

    /// Simulate losing or regaining connectivity.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn command(&self) -> FxResult<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(FxError::CacheUnavailable(
                "memory store unreachable".to_string(),
            ));
        }
        self.commands.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> FxResult<Option<String>> {
        self.command()?;
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            debug!(key, "Expired entry dropped");
            self.entries.remove(key);
        }

        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> FxResult<()> {
        self.command()?;
        let entry = MemoryEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> FxResult<bool> {
        self.command()?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn flush(&self) -> FxResult<()> {
        self.command()?;
        self.entries.clear();
        Ok(())
    }

    async fn ping(&self) -> FxResult<()> {
        self.command()
    }

    async fn info(&self) -> FxResult<StoreInfo> {
        self.command()?;
        self.sweep();

        let memory_used_bytes = self
            .entries
            .iter()
            .map(|e| (e.key().len() + e.value().value.len()) as u64)
            .sum();

        Ok(StoreInfo {
            memory_used_bytes,
            client_count: self.clients.load(Ordering::Relaxed),
            command_count: self.commands.load(Ordering::Relaxed),
            total_keys: self.entries.len() as u64,
        })
    }

    async fn count_prefix(&self, prefix: &str) -> FxResult<u64> {
        self.command()?;
        let now = Instant::now();
        let count = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().is_live(now))
            .count();
        Ok(count as u64)
    }

    async fn close(&self) -> FxResult<()> {
        let _ = self
            .clients
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v".to_string(), Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.info().await.unwrap().total_keys, 0);
    }

    #[tokio::test]
    async fn test_count_prefix_and_flush() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set_ex("exchange_rate:USD:1", "a".into(), ttl).await.unwrap();
        store.set_ex("exchange_rate:EUR:1", "b".into(), ttl).await.unwrap();
        store.set_ex("other", "c".into(), ttl).await.unwrap();

        assert_eq!(store.count_prefix("exchange_rate:").await.unwrap(), 2);
        assert_eq!(store.info().await.unwrap().total_keys, 3);

        store.flush().await.unwrap();
        assert_eq!(store.info().await.unwrap().total_keys, 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_commands() {
        let store = MemoryStore::new();
        store.set_reachable(false);

        assert_err!(store.ping().await);
        assert!(store.get("k").await.unwrap_err().is_cache_error());

        store.set_reachable(true);
        assert_ok!(store.ping().await);
    }

    #[tokio::test]
    async fn test_commands_are_counted() {
        let store = MemoryStore::new();
        store.ping().await.unwrap();
        store.get("k").await.unwrap();

        let info = store.info().await.unwrap();
        assert_eq!(info.command_count, 3);
        assert_eq!(info.client_count, 1);
    }
}
