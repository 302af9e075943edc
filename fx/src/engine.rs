//! Cache-aside conversion engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fxgate_common::{apply_rate, ConversionError, Currency};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::cache::{RateCache, CACHE_PREFIX};
use crate::conversion::{ConversionRequest, ConversionResult, RateQuote, ValidRequest};
use crate::snapshot::{Provenance, RateSnapshot, RateSource};
use crate::upstream::UpstreamClient;

/// Configuration for the conversion engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of cached snapshots; also the key bucket width.
    pub ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(1800),
        }
    }
}

/// Validates requests and converts them using cached or fetched rates.
pub struct ConversionEngine {
    cache: Arc<RateCache>,
    upstream: Arc<UpstreamClient>,
    config: EngineConfig,
}

impl ConversionEngine {
    /// Create a new engine.
    pub fn new(cache: Arc<RateCache>, upstream: Arc<UpstreamClient>, config: EngineConfig) -> Self {
        Self {
            cache,
            upstream,
            config,
        }
    }

    /// Configured cache TTL.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Cache key for the snapshot of `base` in the TTL window holding `now`.
    pub fn cache_key(&self, base: Currency, now: DateTime<Utc>) -> String {
        let window = self.config.ttl.as_secs().max(1) as i64;
        let bucket = now.timestamp().div_euclid(window);
        format!("{}:{}:{}", CACHE_PREFIX, base.code(), bucket)
    }

    /// Convert an amount to another currency.
    #[instrument(skip(self, request), fields(
        from_currency = %request.from_currency,
        to_currency = %request.to_currency,
        amount = %request.amount
    ))]
    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        let valid = request.validate().map_err(|e| {
            warn!(error = %e, "Conversion rejected");
            e
        })?;

        if valid.from == valid.to {
            return Ok(identity(valid));
        }

        let (rate, source) = self.resolve_rate(valid.from, valid.to, true).await;
        let converted_amount = apply_rate(valid.amount, rate).ok_or_else(|| {
            warn!(rate = %rate, "Converted amount overflows");
            ConversionError::validation("amount", "too large to convert")
        })?;
        let result = ConversionResult {
            amount: valid.amount,
            from_currency: valid.from,
            to_currency: valid.to,
            converted_amount,
            rate,
            timestamp: Utc::now(),
            cached: source == RateSource::Cached,
            source,
        };

        info!(
            converted_amount = %result.converted_amount,
            rate = %result.rate,
            source = ?result.source,
            "Conversion completed"
        );

        Ok(result)
    }

    /// Look up the rate between two currency codes.
    ///
    /// With `use_cache` false the cache is neither read nor written.
    #[instrument(skip(self))]
    pub async fn rate(
        &self,
        from: &str,
        to: &str,
        use_cache: bool,
    ) -> Result<RateQuote, ConversionError> {
        let from = Currency::parse("from_currency", from)?;
        let to = Currency::parse("to_currency", to)?;

        let (rate, source) = if from == to {
            (Decimal::ONE, RateSource::Identity)
        } else {
            self.resolve_rate(from, to, use_cache).await
        };

        Ok(RateQuote {
            from_currency: from,
            to_currency: to,
            rate,
            source,
            timestamp: Utc::now(),
        })
    }

    async fn resolve_rate(&self, from: Currency, to: Currency, use_cache: bool) -> (Decimal, RateSource) {
        let base = self.upstream.snapshot_base(from);
        let (snapshot, source) = if use_cache {
            self.snapshot_via_cache(base).await
        } else {
            let snapshot = self.upstream.fetch_rates(base).await;
            let source = RateSource::from(snapshot.provenance);
            (snapshot, source)
        };

        match snapshot.rate(from, to) {
            Ok(rate) => (rate, source),
            Err(e) => {
                warn!(error = %e, "Snapshot incomplete, using fallback rate");
                (self.upstream.fallback().rate(from, to), RateSource::Fallback)
            }
        }
    }

    async fn snapshot_via_cache(&self, base: Currency) -> (RateSnapshot, RateSource) {
        let key = self.cache_key(base, Utc::now());

        match self.cache.get::<RateSnapshot>(&key).await {
            Ok(Some(snapshot)) => return (snapshot, RateSource::Cached),
            Ok(None) => debug!(key = %key, "Snapshot not cached"),
            Err(e) => warn!(key = %key, error = %e, "Cache unavailable, treating as miss"),
        }

        let snapshot = self.upstream.fetch_rates(base).await;

        // Fallback snapshots stay out of the cache so recovery is picked up
        // on the next request.
        if snapshot.provenance == Provenance::Fresh {
            if let Err(e) = self.cache.set(&key, &snapshot, self.config.ttl).await {
                warn!(key = %key, error = %e, "Failed to cache snapshot");
            }
        }

        let source = RateSource::from(snapshot.provenance);
        (snapshot, source)
    }
}

fn identity(valid: ValidRequest) -> ConversionResult {
    ConversionResult {
        amount: valid.amount,
        from_currency: valid.from,
        to_currency: valid.to,
        converted_amount: valid.amount,
        rate: Decimal::ONE,
        timestamp: Utc::now(),
        cached: false,
        source: RateSource::Identity,
    }
}
