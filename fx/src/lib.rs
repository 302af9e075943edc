//! fxgate FX Engine
//!
//! Currency conversion with a cache-aside rate snapshot store in front of
//! an upstream exchange-rate provider.
//!
//! # Features
//!
//! - Rate snapshots cached per base currency in fixed TTL windows
//! - Cache failures degrade to misses, never to errors
//! - Upstream failures and timeouts degrade to static fallback rates
//! - Ordered batch conversion with bounded concurrency
//!
//! # Example
//!
//! ```rust,ignore
//! use fxgate_fx::{ConversionEngine, ConversionRequest, EngineConfig, MemoryStore, RateCache};
//!
//! let cache = Arc::new(RateCache::new());
//! cache.connect(Arc::new(MemoryStore::new())).await?;
//!
//! let engine = ConversionEngine::new(cache, upstream, EngineConfig::default());
//! let result = engine
//!     .convert(&ConversionRequest::new(dec!(100), "USD", "EUR"))
//!     .await?;
//! ```

pub mod batch;
pub mod cache;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod provider;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod snapshot;
pub mod store;
pub mod upstream;

pub use batch::{BatchConfig, BatchCoordinator, ItemOutcome};
pub use cache::{CacheStats, RateCache, RateCacheConfig, CACHE_PREFIX};
pub use conversion::{ConversionRequest, ConversionResult, RateQuote, ValidRequest};
pub use engine::{ConversionEngine, EngineConfig};
pub use error::{FxError, FxResult};
pub use fallback::FallbackRates;
#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
pub use provider::{HttpProviderConfig, HttpRateProvider, RateProvider};
#[cfg(feature = "redis")]
pub use redis_store::{RedisSettings, RedisStore};
pub use snapshot::{Provenance, RateSnapshot, RateSource};
pub use store::{KeyValueStore, MemoryStore, StoreInfo};
pub use upstream::{ProbeOutcome, UpstreamClient, UpstreamConfig};
