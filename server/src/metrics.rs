//! Metrics collection for service monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fxgate_common::ConversionError;
use fxgate_fx::{ConversionResult, RateSource};
use serde::Serialize;

/// Service metrics.
pub struct Metrics {
    /// Conversions attempted.
    pub conversions_total: AtomicU64,
    /// Conversions that produced a result.
    pub conversions_succeeded: AtomicU64,
    /// Conversions rejected by validation.
    pub conversions_rejected: AtomicU64,
    /// Rates served from cache.
    pub cache_hits: AtomicU64,
    /// Rates that required an upstream fetch.
    pub cache_misses: AtomicU64,
    /// Conversions answered from the fallback table.
    pub upstream_fallbacks: AtomicU64,
    /// Batches accepted.
    pub batches_total: AtomicU64,
    /// Items across accepted batches.
    pub batch_items_total: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            conversions_total: AtomicU64::new(0),
            conversions_succeeded: AtomicU64::new(0),
            conversions_rejected: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            upstream_fallbacks: AtomicU64::new(0),
            batches_total: AtomicU64::new(0),
            batch_items_total: AtomicU64::new(0),
        }
    }

    /// Record the outcome of one conversion.
    pub fn record_conversion(&self, outcome: &Result<ConversionResult, ConversionError>) {
        self.conversions_total.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(result) => {
                self.conversions_succeeded.fetch_add(1, Ordering::Relaxed);
                self.record_source(result.source);
            }
            Err(_) => {
                self.conversions_rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record where a rate came from.
    pub fn record_source(&self, source: RateSource) {
        match source {
            RateSource::Cached => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
            }
            RateSource::Fresh => {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
            }
            RateSource::Fallback => {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
                self.upstream_fallbacks.fetch_add(1, Ordering::Relaxed);
            }
            RateSource::Identity => {}
        }
    }

    /// Record an accepted batch.
    pub fn record_batch(&self, items: usize) {
        self.batches_total.fetch_add(1, Ordering::Relaxed);
        self.batch_items_total
            .fetch_add(items as u64, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            conversions_total: self.conversions_total.load(Ordering::Relaxed),
            conversions_succeeded: self.conversions_succeeded.load(Ordering::Relaxed),
            conversions_rejected: self.conversions_rejected.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_fallbacks: self.upstream_fallbacks.load(Ordering::Relaxed),
            batches_total: self.batches_total.load(Ordering::Relaxed),
            batch_items_total: self.batch_items_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub conversions_total: u64,
    pub conversions_succeeded: u64,
    pub conversions_rejected: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_fallbacks: u64,
    pub batches_total: u64,
    pub batch_items_total: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fxgate_common::Currency;
    use rust_decimal_macros::dec;

    fn result(source: RateSource) -> ConversionResult {
        ConversionResult {
            amount: dec!(1),
            from_currency: Currency::Usd,
            to_currency: Currency::Eur,
            converted_amount: dec!(0.9),
            rate: dec!(0.9),
            timestamp: Utc::now(),
            cached: source == RateSource::Cached,
            source,
        }
    }

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.record_conversion(&Ok(result(RateSource::Fresh)));
        metrics.record_conversion(&Ok(result(RateSource::Cached)));
        metrics.record_conversion(&Ok(result(RateSource::Fallback)));
        metrics.record_conversion(&Ok(result(RateSource::Identity)));
        metrics.record_conversion(&Err(ConversionError::validation("amount", "bad")));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.conversions_total, 5);
        assert_eq!(snapshot.conversions_succeeded, 4);
        assert_eq!(snapshot.conversions_rejected, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 2);
        assert_eq!(snapshot.upstream_fallbacks, 1);
    }

    #[test]
    fn test_batch_counters() {
        let metrics = Metrics::new();
        metrics.record_batch(3);
        metrics.record_batch(0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_total, 2);
        assert_eq!(snapshot.batch_items_total, 3);
    }
}
