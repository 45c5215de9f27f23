//! Rate table
//!
//! Directional exchange rates between ordered currency pairs. Rates apply to
//! minor units directly; with a uniform minor-unit scale that is the same
//! number as the major-unit rate.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::{CurrencyCode, CurrencyError};

/// Ordered `(from, to)` currency pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
}

impl CurrencyPair {
    pub fn new(from: CurrencyCode, to: CurrencyCode) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.from, self.to)
    }
}

/// Errors building a rate table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("Rate for {pair} must be positive (got {rate})")]
    NotPositive { pair: String, rate: Decimal },

    #[error("Rate for {0} maps a currency onto itself")]
    IdentityPair(String),

    #[error("Malformed rate entry: {0:?} (expected FROM:TO=RATE)")]
    Malformed(String),

    #[error(transparent)]
    Currency(#[from] CurrencyError),
}

/// Errors converting an amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("Unsupported currency conversion {from} -> {to}")]
    Unsupported { from: CurrencyCode, to: CurrencyCode },

    #[error("Converted amount overflows for {from} -> {to}")]
    Overflow { from: CurrencyCode, to: CurrencyCode },
}

/// Result of converting an amount between currencies.
///
/// `converted` is `exact` truncated toward zero; `remainder` is the
/// fractional minor units lost to truncation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub amount: i64,
    /// `None` for same-currency (identity) conversions
    pub rate: Option<Decimal>,
    pub exact: Decimal,
    pub converted: i64,
    pub remainder: Decimal,
}

impl Conversion {
    pub fn is_identity(&self) -> bool {
        self.rate.is_none()
    }
}

/// Enumerated set of supported ordered pairs and their rates.
///
/// Rates are never inverted automatically: `USD:JPY` says nothing about
/// `JPY:USD`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateTable {
    rates: BTreeMap<CurrencyPair, Decimal>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed demo rates the wallet service has always shipped with.
    pub fn reference_rates() -> Self {
        let direct = [
            ("USD", "IDR", "16000"),
            ("USD", "EUR", "0.9"),
            ("EUR", "USD", "1.111"),
            ("USD", "JPY", "147.49"),
            ("EUR", "JPY", "165"),
        ];
        // Reverse legs quoted as the reciprocal of the forward rate.
        let reciprocal = [("IDR", "USD", "16000"), ("JPY", "USD", "147.49"), ("JPY", "EUR", "165")];

        let mut table = Self::new();
        for (from, to, rate) in direct {
            table.insert_static(from, to, Decimal::from_str(rate).unwrap_or_default());
        }
        for (from, to, rate) in reciprocal {
            let forward = Decimal::from_str(rate).unwrap_or_default();
            if let Some(rate) = Decimal::ONE.checked_div(forward) {
                table.insert_static(from, to, rate);
            }
        }
        table
    }

    fn insert_static(&mut self, from: &str, to: &str, rate: Decimal) {
        if let (Ok(from), Ok(to)) = (CurrencyCode::new(from), CurrencyCode::new(to)) {
            if rate > Decimal::ZERO {
                self.rates.insert(CurrencyPair::new(from, to), rate);
            }
        }
    }

    /// Add or replace the rate for one ordered pair.
    pub fn with_rate(
        mut self,
        from: CurrencyCode,
        to: CurrencyCode,
        rate: Decimal,
    ) -> Result<Self, RateError> {
        self.insert(from, to, rate)?;
        Ok(self)
    }

    pub fn insert(
        &mut self,
        from: CurrencyCode,
        to: CurrencyCode,
        rate: Decimal,
    ) -> Result<(), RateError> {
        let pair = CurrencyPair::new(from, to);
        if pair.from == pair.to {
            return Err(RateError::IdentityPair(pair.to_string()));
        }
        if rate <= Decimal::ZERO {
            return Err(RateError::NotPositive {
                pair: pair.to_string(),
                rate,
            });
        }
        self.rates.insert(pair, rate);
        Ok(())
    }

    /// Parse `FROM:TO=RATE` entries separated by commas, e.g.
    /// `USD:JPY=147.49,JPY:USD=0.00678`.
    pub fn parse(entries: &str) -> Result<Self, RateError> {
        let mut table = Self::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (pair, rate) = entry
                .split_once('=')
                .ok_or_else(|| RateError::Malformed(entry.to_string()))?;
            let (from, to) = pair
                .split_once(':')
                .ok_or_else(|| RateError::Malformed(entry.to_string()))?;
            let rate = Decimal::from_str(rate.trim())
                .map_err(|_| RateError::Malformed(entry.to_string()))?;
            table.insert(CurrencyCode::new(from)?, CurrencyCode::new(to)?, rate)?;
        }
        Ok(table)
    }

    pub fn rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Option<Decimal> {
        self.rates
            .get(&CurrencyPair::new(from.clone(), to.clone()))
            .copied()
    }

    pub fn supported_pairs(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.rates.keys()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Convert `amount` minor units of `from` into minor units of `to`,
    /// truncating toward zero.
    pub fn convert(
        &self,
        amount: i64,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Conversion, ConversionError> {
        if from == to {
            return Ok(Conversion {
                from: from.clone(),
                to: to.clone(),
                amount,
                rate: None,
                exact: Decimal::from(amount),
                converted: amount,
                remainder: Decimal::ZERO,
            });
        }

        let rate = self.rate(from, to).ok_or_else(|| ConversionError::Unsupported {
            from: from.clone(),
            to: to.clone(),
        })?;

        let overflow = || ConversionError::Overflow {
            from: from.clone(),
            to: to.clone(),
        };

        let exact = Decimal::from(amount).checked_mul(rate).ok_or_else(overflow)?;
        let truncated = exact.round_dp_with_strategy(0, RoundingStrategy::ToZero);
        let converted = truncated.to_i64().ok_or_else(overflow)?;

        Ok(Conversion {
            from: from.clone(),
            to: to.clone(),
            amount,
            rate: Some(rate),
            exact,
            converted,
            remainder: exact - truncated,
        })
    }
}
