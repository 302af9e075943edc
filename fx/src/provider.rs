//! Rate provider trait and the HTTP implementation.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use fxgate_common::Currency;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};
use crate::snapshot::{Provenance, RateSnapshot};

/// Trait for upstream exchange-rate providers.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Base currency of the snapshot returned for a `requested` base.
    ///
    /// Providers that only quote against one currency return it here, so
    /// every pair shares a single snapshot.
    fn snapshot_base(&self, requested: Currency) -> Currency {
        requested
    }

    /// Fetch quotes for every supported currency against `base`.
    async fn fetch(&self, base: Currency) -> FxResult<RateSnapshot>;
}

/// Configuration for [`HttpRateProvider`].
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Latest-rates endpoint.
    pub api_url: String,
    /// Access key; keyed access pins the base to EUR.
    pub api_key: Option<String>,
    /// Transport timeout.
    pub timeout: Duration,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.exchangeratesapi.io/v1/latest".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Body of a latest-rates response.
#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    rates: HashMap<String, Decimal>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    info: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

fn default_success() -> bool {
    true
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> FxError {
    if err.is_timeout() {
        FxError::UpstreamTimeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        FxError::UpstreamUnavailable(format_reqwest_error(&err))
    }
}

/// Client for exchangeratesapi.io-style latest-rates endpoints.
#[derive(Debug, Clone)]
pub struct HttpRateProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpRateProvider {
    /// Create a new HTTP provider.
    pub fn new(config: HttpProviderConfig) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fxgate/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(4)
            .timeout(config.timeout)
            .build()
            .map_err(|e| FxError::UpstreamUnavailable(format_reqwest_error(&e)))?;

        Ok(Self { client, config })
    }

    fn query(&self, base: Currency) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(2);
        match &self.config.api_key {
            Some(key) => query.push(("access_key", key.clone())),
            None => query.push(("base", base.code().to_string())),
        }
        query.push(("symbols", Currency::codes().join(",")));
        query
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    fn name(&self) -> &str {
        "exchangeratesapi"
    }

    fn snapshot_base(&self, requested: Currency) -> Currency {
        if self.config.api_key.is_some() {
            Currency::Eur
        } else {
            requested
        }
    }

    async fn fetch(&self, base: Currency) -> FxResult<RateSnapshot> {
        let base = self.snapshot_base(base);
        debug!(url = %self.config.api_url, base = %base, "Fetching latest rates");

        let resp = self
            .client
            .get(&self.config.api_url)
            .query(&self.query(base))
            .send()
            .await
            .map_err(|e| transport_error(e, self.config.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FxError::UpstreamStatus {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        let body: LatestRatesResponse = resp
            .json()
            .await
            .map_err(|e| transport_error(e, self.config.timeout))?;

        parse_response(body, base)
    }
}

/// Turn a provider body into a snapshot, ignoring unsupported codes.
fn parse_response(body: LatestRatesResponse, expected_base: Currency) -> FxResult<RateSnapshot> {
    if !body.success {
        let info = body
            .error
            .and_then(|e| e.info.or(e.kind))
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(FxError::UpstreamRejected(info));
    }

    let base = match body.base.as_deref() {
        Some(code) => Currency::parse("base", code)
            .map_err(|_| FxError::UpstreamRejected(format!("unsupported base {}", code)))?,
        None => expected_base,
    };
    if base != expected_base {
        warn!(expected = %expected_base, actual = %base, "Provider answered with a different base");
    }

    let quotes: Vec<(Currency, Decimal)> = body
        .rates
        .iter()
        .filter_map(|(code, quote)| Currency::parse("rates", code).ok().map(|c| (c, *quote)))
        .collect();

    if quotes.is_empty() {
        return Err(FxError::UpstreamRejected(format!(
            "no rates returned for base {}",
            base
        )));
    }

    Ok(RateSnapshot::new(base, quotes, Provenance::Fresh))
}

/// Mock rate provider for testing.
///
/// Quotes are held per one USD and rebased on each fetch.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    usd_quotes: parking_lot::RwLock<std::collections::BTreeMap<Currency, Decimal>>,
    failure: parking_lot::RwLock<Option<String>>,
    delay: parking_lot::RwLock<Option<Duration>>,
    base_delays: parking_lot::RwLock<std::collections::BTreeMap<Currency, Duration>>,
    pinned_base: Option<Currency>,
    calls: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a mock answering with a fixed table of quotes.
    pub fn new(name: impl Into<String>) -> Self {
        let quotes = [
            (Currency::Usd, Decimal::ONE),
            (Currency::Eur, Decimal::new(90, 2)),
            (Currency::Gbp, Decimal::new(80, 2)),
            (Currency::Jpy, Decimal::new(150, 0)),
            (Currency::Inr, Decimal::new(83, 0)),
            (Currency::Aed, Decimal::new(36725, 4)),
            (Currency::Uzs, Decimal::new(12500, 0)),
        ];
        Self {
            name: name.into(),
            usd_quotes: parking_lot::RwLock::new(quotes.into_iter().collect()),
            failure: parking_lot::RwLock::new(None),
            delay: parking_lot::RwLock::new(None),
            base_delays: parking_lot::RwLock::new(std::collections::BTreeMap::new()),
            pinned_base: None,
            calls: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Always answer with snapshots against `base`.
    pub fn with_pinned_base(mut self, base: Currency) -> Self {
        self.pinned_base = Some(base);
        self
    }

    /// Set the quote of `currency` per one USD.
    pub fn set_usd_quote(&self, currency: Currency, quote: Decimal) {
        self.usd_quotes.write().insert(currency, quote);
    }

    /// Drop the quote of `currency` from answers.
    pub fn remove_quote(&self, currency: Currency) {
        self.usd_quotes.write().remove(&currency);
    }

    /// Make fetches fail until cleared with `None`.
    pub fn set_failure(&self, failure: Option<&str>) {
        *self.failure.write() = failure.map(str::to_string);
    }

    /// Delay every fetch.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }

    /// Delay fetches against one base only.
    pub fn set_base_delay(&self, base: Currency, delay: Duration) {
        self.base_delays.write().insert(base, delay);
    }

    /// Number of fetches attempted.
    pub fn calls(&self) -> u64 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot_base(&self, requested: Currency) -> Currency {
        self.pinned_base.unwrap_or(requested)
    }

    async fn fetch(&self, base: Currency) -> FxResult<RateSnapshot> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let delay = self
            .delay
            .read()
            .or_else(|| self.base_delays.read().get(&self.snapshot_base(base)).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.read().clone();
        if let Some(message) = failure {
            return Err(FxError::UpstreamUnavailable(message));
        }

        let base = self.snapshot_base(base);
        let quotes = self.usd_quotes.read().clone();
        let base_quote = quotes.get(&base).copied().ok_or(FxError::MissingQuote {
            base,
            currency: base,
        })?;

        let rebased = quotes
            .into_iter()
            .filter(|(c, _)| *c != base)
            .map(|(c, q)| (c, q / base_quote));
        Ok(RateSnapshot::new(base, rebased, Provenance::Fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_response_keeps_supported_codes() {
        let body: LatestRatesResponse = serde_json::from_str(
            r#"{
                "success": true,
                "timestamp": 1700000000,
                "base": "EUR",
                "date": "2024-01-01",
                "rates": {"USD": 1.08, "GBP": 0.86, "CHF": 0.95, "UZS": 13500}
            }"#,
        )
        .unwrap();

        let snapshot = parse_response(body, Currency::Eur).unwrap();

        assert_eq!(snapshot.base, Currency::Eur);
        assert_eq!(snapshot.provenance, Provenance::Fresh);
        assert_eq!(snapshot.quotes.len(), 3);
        assert_eq!(snapshot.quote(Currency::Usd).unwrap(), dec!(1.08));
    }

    #[test]
    fn test_parse_response_error_body() {
        let body: LatestRatesResponse = serde_json::from_str(
            r#"{"success": false, "error": {"code": 105, "type": "base_currency_access_restricted"}}"#,
        )
        .unwrap();

        let err = parse_response(body, Currency::Usd).unwrap_err();
        assert!(matches!(err, FxError::UpstreamRejected(ref m) if m == "base_currency_access_restricted"));
    }

    #[test]
    fn test_parse_response_without_rates() {
        let body: LatestRatesResponse = serde_json::from_str(r#"{"base": "USD", "rates": {}}"#).unwrap();
        assert!(parse_response(body, Currency::Usd).is_err());
    }

    #[test]
    fn test_keyed_access_pins_eur_base() {
        let keyed = HttpRateProvider::new(HttpProviderConfig {
            api_key: Some("k".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(keyed.snapshot_base(Currency::Usd), Currency::Eur);
        assert_eq!(keyed.query(Currency::Usd)[0], ("access_key", "k".to_string()));

        let open = HttpRateProvider::new(HttpProviderConfig::default()).unwrap();
        assert_eq!(open.snapshot_base(Currency::Gbp), Currency::Gbp);
        assert_eq!(open.query(Currency::Gbp)[0], ("base", "GBP".to_string()));
        assert_eq!(open.query(Currency::Gbp)[1].1, "USD,EUR,GBP,JPY,INR,AED,UZS");
    }

    #[tokio::test]
    async fn test_mock_provider_rebases() {
        let provider = MockRateProvider::new("test");
        let usd = provider.fetch(Currency::Usd).await.unwrap();
        assert_eq!(usd.rate(Currency::Usd, Currency::Gbp).unwrap(), dec!(0.8));

        let eur = provider.fetch(Currency::Eur).await.unwrap();
        assert_eq!(eur.base, Currency::Eur);
        assert_eq!(eur.quote(Currency::Usd).unwrap(), dec!(1) / dec!(0.90));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_provider_failure() {
        let provider = MockRateProvider::new("test");
        provider.set_failure(Some("down"));

        let err = provider.fetch(Currency::Usd).await.unwrap_err();
        assert!(err.is_upstream_error());
    }
}
