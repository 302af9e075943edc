//! Rate snapshots and result provenance.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fxgate_common::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Live answer from the upstream provider.
    Fresh,
    /// Built from the static fallback table.
    Fallback,
}

/// Where the rate behind a conversion result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Same-currency conversion, no lookup.
    Identity,
    /// Fetched from upstream for this request.
    Fresh,
    /// Served from the cache.
    Cached,
    /// Static fallback rate.
    Fallback,
}

impl From<Provenance> for RateSource {
    fn from(p: Provenance) -> Self {
        match p {
            Provenance::Fresh => RateSource::Fresh,
            Provenance::Fallback => RateSource::Fallback,
        }
    }
}

/// Quotes of every known currency against one base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Reference currency; its own quote is always 1.
    pub base: Currency,
    /// Units of each currency per one unit of base.
    pub quotes: BTreeMap<Currency, Decimal>,
    /// When the snapshot was produced.
    pub fetched_at: DateTime<Utc>,
    /// Fresh or fallback.
    pub provenance: Provenance,
}

impl RateSnapshot {
    /// Create a snapshot stamped now. Non-positive quotes are dropped.
    pub fn new(
        base: Currency,
        quotes: impl IntoIterator<Item = (Currency, Decimal)>,
        provenance: Provenance,
    ) -> Self {
        let quotes = quotes
            .into_iter()
            .filter(|(_, q)| *q > Decimal::ZERO)
            .collect();
        Self {
            base,
            quotes,
            fetched_at: Utc::now(),
            provenance,
        }
    }

    /// Quote of `currency` against the base.
    pub fn quote(&self, currency: Currency) -> FxResult<Decimal> {
        if currency == self.base {
            return Ok(Decimal::ONE);
        }
        self.quotes
            .get(&currency)
            .copied()
            .filter(|q| *q > Decimal::ZERO)
            .ok_or(FxError::MissingQuote {
                base: self.base,
                currency,
            })
    }

    /// Full-precision multiplier converting `from` into `to`.
    pub fn rate(&self, from: Currency, to: Currency) -> FxResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let to_quote = self.quote(to)?;
        if from == self.base {
            return Ok(to_quote);
        }
        let from_quote = self.quote(from)?;
        to_quote
            .checked_div(from_quote)
            .ok_or(FxError::MissingQuote {
                base: self.base,
                currency: from,
            })
    }

    /// Check whether every supported currency has a quote.
    pub fn is_complete(&self) -> bool {
        Currency::ALL.iter().all(|c| self.quote(*c).is_ok())
    }
}
