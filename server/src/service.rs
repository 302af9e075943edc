//! Currency service facade.

use std::sync::Arc;
use std::time::Duration;

use fxgate_common::{ConversionError, Currency};
use fxgate_fx::{
    BatchCoordinator, CacheStats, ConversionEngine, ConversionRequest, ConversionResult,
    EngineConfig, FxResult, ItemOutcome, KeyValueStore, ProbeOutcome, RateCache,
    RateCacheConfig, RateProvider, RateQuote, UpstreamClient, UpstreamConfig,
};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::ServiceConfig;
use crate::metrics::{Metrics, MetricsSnapshot, SharedMetrics};
use crate::state::ServiceState;

/// Cache dependency status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheHealth {
    Connected,
    Disconnected,
    NotConfigured,
}

/// Overall service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: OverallHealth,
    pub cache: CacheHealth,
    pub api: ProbeOutcome,
}

impl HealthReport {
    /// Derive the overall status from the dependency states.
    pub fn new(cache: CacheHealth, api: ProbeOutcome) -> Self {
        let cache_up = cache == CacheHealth::Connected;
        let api_up = api == ProbeOutcome::Available;
        let status = match (cache_up, api_up) {
            (true, true) => OverallHealth::Healthy,
            (false, false) => OverallHealth::Unhealthy,
            _ => OverallHealth::Degraded,
        };
        Self { status, cache, api }
    }
}

/// Non-secret view of the running configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub service_name: String,
    pub cache_backend: &'static str,
    pub cache_ttl_seconds: u64,
    pub cache_timeout_ms: u64,
    pub exchange_rates_api: String,
    pub exchange_rates_timeout_ms: u64,
    pub batch_max_size: usize,
    pub batch_concurrency: usize,
    pub supported_currencies: Vec<&'static str>,
}

/// The currency conversion service.
///
/// Owns the cache adapter, upstream client, engine and batch coordinator.
/// Every handler goes through this facade.
pub struct CurrencyService {
    config: ServiceConfig,
    state: RwLock<ServiceState>,
    cache: Arc<RateCache>,
    upstream: Arc<UpstreamClient>,
    engine: Arc<ConversionEngine>,
    batch: BatchCoordinator,
    metrics: SharedMetrics,
}

impl CurrencyService {
    /// Create a new service around `provider`. The cache starts detached.
    pub fn new(config: ServiceConfig, provider: Arc<dyn RateProvider>) -> Self {
        let cache = Arc::new(RateCache::with_config(RateCacheConfig {
            op_timeout: config.cache.timeout,
        }));
        let upstream = Arc::new(UpstreamClient::new(
            provider,
            UpstreamConfig {
                timeout: config.upstream.timeout,
                ..Default::default()
            },
        ));
        let engine = Arc::new(ConversionEngine::new(
            cache.clone(),
            upstream.clone(),
            EngineConfig {
                ttl: config.cache_ttl,
            },
        ));
        let batch = BatchCoordinator::new(engine.clone(), config.batch.clone());

        Self {
            config,
            state: RwLock::new(ServiceState::Starting),
            cache,
            upstream,
            engine,
            batch,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Connect the cache and start accepting requests.
    ///
    /// Without a store, or if it cannot be reached, the service runs
    /// uncached.
    #[instrument(skip(self, store))]
    pub async fn start(&self, store: Option<Arc<dyn KeyValueStore>>) {
        info!(service = %self.config.service_name, "Starting service");

        match store {
            Some(store) => {
                if let Err(e) = self.cache.connect(store).await {
                    warn!(error = %e, "Cache connection failed, running without cache");
                }
            }
            None => warn!("No cache backend configured, running without cache"),
        }

        *self.state.write() = ServiceState::Running;
        info!("Service started successfully");
    }

    /// Stop accepting requests and release the cache.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("Stopping service");
        *self.state.write() = ServiceState::ShuttingDown;

        self.cache.disconnect().await;

        *self.state.write() = ServiceState::Stopped;
        info!("Service stopped");
    }

    /// Get the current service state.
    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// Check if the service is accepting requests.
    pub fn is_accepting_requests(&self) -> bool {
        self.state.read().accepts_requests()
    }

    /// Convert a single amount.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        let outcome = self.engine.convert(request).await;
        self.metrics.record_conversion(&outcome);
        outcome
    }

    /// Convert many amounts; see [`BatchCoordinator::convert_batch`].
    pub async fn convert_batch(
        &self,
        requests: Vec<ConversionRequest>,
    ) -> Result<Vec<ItemOutcome>, ConversionError> {
        let outcomes = self.batch.convert_batch(requests).await?;
        self.metrics.record_batch(outcomes.len());
        for outcome in &outcomes {
            self.metrics.record_conversion(outcome);
        }
        Ok(outcomes)
    }

    /// Look up the rate between two currency codes.
    pub async fn rate(
        &self,
        from: &str,
        to: &str,
        use_cache: bool,
    ) -> Result<RateQuote, ConversionError> {
        let quote = self.engine.rate(from, to, use_cache).await?;
        self.metrics.record_source(quote.source);
        Ok(quote)
    }

    /// Check the cache and the upstream API concurrently.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthReport {
        let cache = async {
            if !self.cache.is_attached() {
                CacheHealth::NotConfigured
            } else if self.cache.is_connected().await {
                CacheHealth::Connected
            } else {
                CacheHealth::Disconnected
            }
        };

        let (cache, api) = tokio::join!(cache, self.upstream.probe());
        let report = HealthReport::new(cache, api);
        if report.status != OverallHealth::Healthy {
            warn!(cache = ?report.cache, api = ?report.api, "Service degraded");
        }
        report
    }

    /// Cache statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Remove every cached snapshot.
    pub async fn clear_cache(&self) -> FxResult<()> {
        self.cache.delete_all().await
    }

    /// Supported currency codes.
    pub fn currencies(&self) -> Vec<&'static str> {
        Currency::codes()
    }

    /// Running configuration without secrets.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            service_name: self.config.service_name.clone(),
            cache_backend: if self.config.redis_requested() {
                "redis"
            } else {
                "memory"
            },
            cache_ttl_seconds: self.config.cache_ttl.as_secs(),
            cache_timeout_ms: millis(self.config.cache.timeout),
            exchange_rates_api: self.config.upstream.url.clone(),
            exchange_rates_timeout_ms: millis(self.upstream.timeout()),
            batch_max_size: self.batch.config().max_batch_size,
            batch_concurrency: self.batch.config().concurrency,
            supported_currencies: Currency::codes(),
        }
    }

    /// Current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxgate_fx::{MemoryStore, MockRateProvider, RateSource};
    use rust_decimal_macros::dec;

    fn test_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.upstream.timeout = Duration::from_millis(100);
        config.cache.timeout = Duration::from_millis(100);
        config
    }

    async fn started_service() -> (CurrencyService, Arc<MockRateProvider>, Arc<MemoryStore>) {
        let provider = Arc::new(MockRateProvider::new("test"));
        let store = Arc::new(MemoryStore::new());
        let service = CurrencyService::new(test_config(), provider.clone());
        service.start(Some(store.clone())).await;
        (service, provider, store)
    }

    #[tokio::test]
    async fn test_service_start_stop() {
        let (service, _, _) = started_service().await;
        assert_eq!(service.state(), ServiceState::Running);
        assert!(service.is_accepting_requests());

        service.stop().await;
        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(service.health_check().await.cache, CacheHealth::NotConfigured);
    }

    #[tokio::test]
    async fn test_healthy_when_both_dependencies_up() {
        let (service, _, _) = started_service().await;

        let report = service.health_check().await;

        assert_eq!(report.status, OverallHealth::Healthy);
        assert_eq!(report.cache, CacheHealth::Connected);
        assert_eq!(report.api, ProbeOutcome::Available);
    }

    #[tokio::test]
    async fn test_degraded_and_unhealthy() {
        let (service, provider, store) = started_service().await;

        store.set_reachable(false);
        let report = service.health_check().await;
        assert_eq!(report.status, OverallHealth::Degraded);
        assert_eq!(report.cache, CacheHealth::Disconnected);

        provider.set_delay(Some(Duration::from_secs(5)));
        let report = service.health_check().await;
        assert_eq!(report.status, OverallHealth::Unhealthy);
        assert_eq!(report.api, ProbeOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_start_without_store_runs_uncached() {
        let provider = Arc::new(MockRateProvider::new("test"));
        let service = CurrencyService::new(test_config(), provider);
        service.start(None).await;

        let result = service
            .convert(&ConversionRequest::new(dec!(100), "USD", "EUR"))
            .await
            .unwrap();
        assert_eq!(result.source, RateSource::Fresh);

        let report = service.health_check().await;
        assert_eq!(report.cache, CacheHealth::NotConfigured);
        assert_eq!(report.status, OverallHealth::Degraded);
        tokio_test::assert_ok!(service.clear_cache().await);
    }

    #[tokio::test]
    async fn test_clear_cache_resets_stats() {
        let (service, _, _) = started_service().await;
        service
            .convert(&ConversionRequest::new(dec!(100), "USD", "EUR"))
            .await
            .unwrap();
        assert_eq!(service.cache_stats().await.cached_rates, 1);

        service.clear_cache().await.unwrap();

        let stats = service.cache_stats().await;
        assert!(stats.connected);
        assert_eq!(stats.total_keys, 0);
        assert_eq!(stats.cached_rates, 0);
    }

    #[tokio::test]
    async fn test_metrics_follow_conversions() {
        let (service, _, _) = started_service().await;
        let request = ConversionRequest::new(dec!(100), "USD", "EUR");

        service.convert(&request).await.unwrap();
        service.convert(&request).await.unwrap();
        let _ = service
            .convert_batch(vec![request, ConversionRequest::new(dec!(-1), "USD", "EUR")])
            .await
            .unwrap();

        let metrics = service.metrics();
        assert_eq!(metrics.conversions_total, 4);
        assert_eq!(metrics.conversions_rejected, 1);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.cache_hits, 2);
        assert_eq!(metrics.batches_total, 1);
        assert_eq!(metrics.batch_items_total, 2);
    }

    #[tokio::test]
    async fn test_effective_config_hides_secrets() {
        let mut config = test_config();
        config.upstream.api_key = Some("top-secret".to_string());
        config.cache.password = Some("hunter2".to_string());
        let service = CurrencyService::new(config, Arc::new(MockRateProvider::new("test")));

        let effective = service.effective_config();
        let json = serde_json::to_string(&effective).unwrap();

        assert_eq!(effective.cache_ttl_seconds, 1800);
        assert_eq!(effective.supported_currencies.len(), Currency::COUNT);
        assert!(!json.contains("top-secret"));
        assert!(!json.contains("hunter2"));
    }
}
