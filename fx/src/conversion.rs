//! Currency conversion request and result types.

use chrono::{DateTime, Utc};
use fxgate_common::{ConversionError, Currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::snapshot::RateSource;

/// Conversion request as submitted by a caller.
///
/// Currency codes stay raw strings until [`ConversionRequest::validate`],
/// so a bad code fails only its own request inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Amount to convert.
    pub amount: Decimal,
    /// Source currency code.
    pub from_currency: String,
    /// Target currency code.
    pub to_currency: String,
}

impl ConversionRequest {
    /// Create a new conversion request.
    pub fn new(amount: Decimal, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            amount,
            from_currency: from.into(),
            to_currency: to.into(),
        }
    }

    /// Check the amount, then both currency codes.
    pub fn validate(&self) -> Result<ValidRequest, ConversionError> {
        if self.amount <= Decimal::ZERO {
            return Err(ConversionError::validation(
                "amount",
                "must be greater than 0",
            ));
        }
        let from = Currency::parse("from_currency", &self.from_currency)?;
        let to = Currency::parse("to_currency", &self.to_currency)?;

        Ok(ValidRequest {
            amount: self.amount,
            from,
            to,
        })
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRequest {
    pub amount: Decimal,
    pub from: Currency,
    pub to: Currency,
}

/// Represents a completed currency conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Input amount.
    pub amount: Decimal,
    /// Source currency.
    pub from_currency: Currency,
    /// Target currency.
    pub to_currency: Currency,
    /// Output amount, rounded for display.
    pub converted_amount: Decimal,
    /// Full-precision rate used.
    pub rate: Decimal,
    /// When the conversion was computed.
    pub timestamp: DateTime<Utc>,
    /// Whether the rate was served from cache.
    pub cached: bool,
    /// Where the rate came from.
    pub source: RateSource,
}

/// A rate looked up without an amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub rate: Decimal,
    pub source: RateSource,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_ok() {
        let valid = ConversionRequest::new(dec!(100), "usd", "EUR").validate().unwrap();
        assert_eq!(valid.from, Currency::Usd);
        assert_eq!(valid.to, Currency::Eur);
        assert_eq!(valid.amount, dec!(100));
    }

    #[test]
    fn test_validate_amount_checked_first() {
        let err = ConversionRequest::new(dec!(-5), "XXX", "EUR").validate().unwrap_err();
        assert_eq!(err.field(), Some("amount"));

        let err = ConversionRequest::new(dec!(0), "USD", "EUR").validate().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_validate_unsupported_currency() {
        let err = ConversionRequest::new(dec!(1), "USD", "CHF").validate().unwrap_err();
        assert_eq!(
            err,
            ConversionError::UnsupportedCurrency {
                field: "to_currency".to_string(),
                code: "CHF".to_string(),
            }
        );
    }

    #[test]
    fn test_request_accepts_numeric_amount() {
        let request: ConversionRequest = serde_json::from_str(
            r#"{"amount": 100.5, "from_currency": "USD", "to_currency": "EUR"}"#,
        )
        .unwrap();
        assert_eq!(request.amount, dec!(100.5));
    }
}
