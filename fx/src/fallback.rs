//! Static fallback rates used while the upstream provider is down.

use fxgate_common::Currency;
use rust_decimal::Decimal;

use crate::error::{FxError, FxResult};
use crate::snapshot::{Provenance, RateSnapshot};

/// Approximate quotes for every supported currency, per one US dollar.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRates {
    usd_quotes: [Decimal; Currency::COUNT],
}

impl FallbackRates {
    /// Override the quote for one currency. Quotes are per one USD.
    pub fn with_quote(mut self, currency: Currency, per_usd: Decimal) -> FxResult<Self> {
        if per_usd <= Decimal::ZERO {
            return Err(FxError::InvalidQuote {
                currency,
                value: per_usd.to_string(),
            });
        }
        if currency == Currency::Usd && per_usd != Decimal::ONE {
            return Err(FxError::InvalidQuote {
                currency,
                value: per_usd.to_string(),
            });
        }
        self.usd_quotes[currency.index()] = per_usd;
        Ok(self)
    }

    /// Quote of `currency` per one USD.
    pub fn usd_quote(&self, currency: Currency) -> Decimal {
        self.usd_quotes[currency.index()]
    }

    /// Approximate multiplier converting `from` into `to`.
    pub fn rate(&self, from: Currency, to: Currency) -> Decimal {
        if from == to {
            return Decimal::ONE;
        }
        self.usd_quote(to) / self.usd_quote(from)
    }

    /// Full snapshot rebased onto `base`.
    pub fn snapshot(&self, base: Currency) -> RateSnapshot {
        let quotes = Currency::ALL
            .iter()
            .filter(|c| **c != base)
            .map(|c| (*c, self.rate(base, *c)));
        RateSnapshot::new(base, quotes, Provenance::Fallback)
    }
}

impl Default for FallbackRates {
    fn default() -> Self {
        // Indexed in `Currency::ALL` order.
        Self {
            usd_quotes: [
                Decimal::ONE,
                Decimal::new(92, 2),
                Decimal::new(79, 2),
                Decimal::new(14950, 2),
                Decimal::new(8312, 2),
                Decimal::new(367, 2),
                Decimal::new(12755, 0),
            ],
        }
    }
}
