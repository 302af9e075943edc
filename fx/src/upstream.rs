//! Upstream rate client with timeout and fallback policy.

use std::sync::Arc;
use std::time::Duration;

use fxgate_common::Currency;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{FxError, FxResult};
use crate::fallback::FallbackRates;
use crate::provider::RateProvider;
use crate::snapshot::RateSnapshot;

/// Outcome of an upstream reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Available,
    Unavailable,
    TimedOut,
}

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Upper bound for a provider fetch.
    pub timeout: Duration,
    /// Rates used when the provider cannot answer.
    pub fallback: FallbackRates,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            fallback: FallbackRates::default(),
        }
    }
}

/// Fetches rate snapshots, degrading to static fallback rates.
///
/// [`UpstreamClient::fetch_rates`] never fails: availability wins over
/// freshness, and the returned snapshot's provenance tells the two apart.
pub struct UpstreamClient {
    provider: Arc<dyn RateProvider>,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Create a new upstream client.
    pub fn new(provider: Arc<dyn RateProvider>, config: UpstreamConfig) -> Self {
        info!(
            provider = provider.name(),
            timeout_ms = config.timeout.as_millis() as u64,
            "Upstream client initialized"
        );
        Self { provider, config }
    }

    /// Base currency of the snapshot that serves `from`.
    pub fn snapshot_base(&self, from: Currency) -> Currency {
        self.provider.snapshot_base(from)
    }

    /// Fallback table in use.
    pub fn fallback(&self) -> &FallbackRates {
        &self.config.fallback
    }

    /// Configured fetch timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Fetch a snapshot for `base`, or the fallback snapshot on any failure.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn fetch_rates(&self, base: Currency) -> RateSnapshot {
        let base = self.snapshot_base(base);
        match self.try_fetch(base).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(base = %base, error = %e, "Upstream fetch failed, using fallback rates");
                self.config.fallback.snapshot(base)
            }
        }
    }

    /// Check whether the provider answers within the timeout.
    pub async fn probe(&self) -> ProbeOutcome {
        match self.try_fetch(Currency::Usd).await {
            Ok(_) => ProbeOutcome::Available,
            Err(FxError::UpstreamTimeout { .. }) => ProbeOutcome::TimedOut,
            Err(_) => ProbeOutcome::Unavailable,
        }
    }

    async fn try_fetch(&self, base: Currency) -> FxResult<RateSnapshot> {
        let base = self.snapshot_base(base);
        match tokio::time::timeout(self.config.timeout, self.provider.fetch(base)).await {
            Ok(result) => result,
            Err(_) => Err(FxError::UpstreamTimeout {
                timeout_ms: self.config.timeout.as_millis() as u64,
            }),
        }
    }
}
