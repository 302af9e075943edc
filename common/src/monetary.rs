//! Currency and amount types shared across fxgate.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConversionError;

/// Decimal places used for displayed converted amounts.
pub const DISPLAY_DECIMAL_PLACES: u32 = 2;

/// Supported ISO 4217 currency.
///
/// The set is closed: anything outside it is rejected at the edge by
/// [`Currency::parse`] and never reaches the conversion pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
    Inr,
    Aed,
    Uzs,
}

impl Currency {
    /// Number of supported currencies.
    pub const COUNT: usize = 7;

    /// Every supported currency, in declaration order.
    pub const ALL: [Currency; Self::COUNT] = [
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Jpy,
        Currency::Inr,
        Currency::Aed,
        Currency::Uzs,
    ];

    /// Get the currency code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Inr => "INR",
            Currency::Aed => "AED",
            Currency::Uzs => "UZS",
        }
    }

    /// Position of this currency in [`Currency::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Parse a currency code submitted in `field`.
    ///
    /// Case-insensitive; surrounding whitespace is ignored.
    pub fn parse(field: &str, input: &str) -> Result<Self, ConversionError> {
        let code = input.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .ok_or_else(|| ConversionError::UnsupportedCurrency {
                field: field.to_string(),
                code: input.to_string(),
            })
    }

    /// All supported codes.
    pub fn codes() -> Vec<&'static str> {
        Self::ALL.iter().map(Currency::code).collect()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse("currency", s)
    }
}

/// Round an amount for display.
pub fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DISPLAY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Apply a full-precision rate to an amount and round the result for display.
///
/// Returns `None` when the product does not fit in a `Decimal`.
pub fn apply_rate(amount: Decimal, rate: Decimal) -> Option<Decimal> {
    amount.checked_mul(rate).map(round_display)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_known_codes() {
        assert_eq!(Currency::parse("from_currency", "USD").unwrap(), Currency::Usd);
        assert_eq!(Currency::parse("from_currency", " eur ").unwrap(), Currency::Eur);
        assert_eq!("uzs".parse::<Currency>().unwrap(), Currency::Uzs);
    }

    #[test]
    fn test_parse_unknown_code_names_field() {
        let err = Currency::parse("to_currency", "XYZ").unwrap_err();
        assert_eq!(err.field(), Some("to_currency"));
        assert_eq!(err.error_code(), "UNSUPPORTED_CURRENCY");
    }

    #[test]
    fn test_all_is_indexed_in_order() {
        for (i, currency) in Currency::ALL.iter().enumerate() {
            assert_eq!(currency.index(), i);
        }
        assert_eq!(Currency::codes(), vec!["USD", "EUR", "GBP", "JPY", "INR", "AED", "UZS"]);
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&Currency::Gbp).unwrap();
        assert_eq!(json, "\"GBP\"");
        let back: Currency = serde_json::from_str("\"JPY\"").unwrap();
        assert_eq!(back, Currency::Jpy);
    }

    #[test]
    fn test_round_display_midpoint() {
        assert_eq!(round_display(dec!(1.005)), dec!(1.01));
        assert_eq!(round_display(dec!(2.344)), dec!(2.34));
        assert_eq!(apply_rate(dec!(100), dec!(0.92)), Some(dec!(92.00)));
    }

    #[test]
    fn test_apply_rate_overflow() {
        assert_eq!(apply_rate(Decimal::MAX, dec!(2)), None);
        assert_eq!(apply_rate(Decimal::from_i128_with_scale(10i128.pow(28), 0), dec!(12500)), None);
        assert_eq!(apply_rate(Decimal::MAX, dec!(1)), Some(Decimal::MAX));
    }

    proptest! {
        #[test]
        fn prop_apply_rate_has_two_places(cents in 1i64..10_000_000, rate_micro in 1i64..100_000_000) {
            let amount = Decimal::new(cents, 2);
            let rate = Decimal::new(rate_micro, 6);
            let converted = apply_rate(amount, rate).unwrap();
            prop_assert!(converted.scale() <= DISPLAY_DECIMAL_PLACES);
            prop_assert!((converted - amount * rate).abs() <= dec!(0.005));
        }
    }
}
