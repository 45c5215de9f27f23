//! Amount type
//!
//! Domain primitives for monetary amounts held as integer minor units.
//! Decimal major-unit values only exist at the boundary and are converted
//! here, so the ledger itself never does floating point money arithmetic.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum amount accepted for a single operation, in minor units.
pub const MAX_MINOR_UNITS: i64 = 1_000_000_000_000_000_000;

/// Largest supported number of decimal places for a currency.
pub const MAX_SCALE: u32 = 8;

/// Amount represents a validated, strictly positive quantity of minor units.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Value never exceeds [`MAX_MINOR_UNITS`]
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use wallet_ledger::domain::Amount;
///
/// let amount = Amount::from_major(Decimal::new(1050, 2), 2).unwrap();
/// assert_eq!(amount.minor_units(), 1050);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {max}, got {got})")]
    TooManyDecimals { max: u32, got: u32 },

    #[error("Amount exceeds maximum allowed value ({MAX_MINOR_UNITS} minor units)")]
    Overflow,

    #[error("Unsupported minor unit scale: {0}")]
    InvalidScale(u32),
}

impl Amount {
    /// Create a new Amount from minor units.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::Overflow` if value > [`MAX_MINOR_UNITS`]
    pub fn new(minor_units: i64) -> Result<Self, AmountError> {
        if minor_units <= 0 {
            return Err(AmountError::NotPositive(Decimal::from(minor_units)));
        }
        if minor_units > MAX_MINOR_UNITS {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor_units))
    }

    /// Convert a decimal major-unit value (e.g. `10.50` USD) into minor
    /// units using `scale` decimal places.
    ///
    /// Values carrying more precision than the scale are rejected rather
    /// than rounded.
    pub fn from_major(value: Decimal, scale: u32) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        let normalized = value.normalize();
        if normalized.scale() > scale {
            return Err(AmountError::TooManyDecimals {
                max: scale,
                got: normalized.scale(),
            });
        }

        let minor = normalized
            .checked_mul(scale_factor(scale)?)
            .and_then(|v| v.to_i64())
            .ok_or(AmountError::Overflow)?;

        Self::new(minor)
    }

    /// Get the underlying minor-unit value.
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Express this amount in major units.
    pub fn to_major(&self, scale: u32) -> Decimal {
        minor_to_major(self.0, scale)
    }
}

/// Render a minor-unit quantity as a decimal in major units.
pub fn minor_to_major(minor_units: i64, scale: u32) -> Decimal {
    let mut value = Decimal::from(minor_units);
    // set_scale only fails above 28 places; MAX_SCALE keeps us well below.
    if value.set_scale(scale.min(MAX_SCALE)).is_err() {
        return Decimal::from(minor_units);
    }
    value
}

fn scale_factor(scale: u32) -> Result<Decimal, AmountError> {
    if scale > MAX_SCALE {
        return Err(AmountError::InvalidScale(scale));
    }
    Ok(Decimal::from(10i64.pow(scale)))
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance represents a settled wallet balance (zero or positive).
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(i64);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(minor_units: i64) -> Result<Self, AmountError> {
        if minor_units < 0 {
            return Err(AmountError::NotPositive(Decimal::from(minor_units)));
        }
        Ok(Self(minor_units))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Check if balance can cover a debit of `amount`
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.minor_units()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        let value = self
            .0
            .checked_add(amount.minor_units())
            .ok_or(AmountError::Overflow)?;
        Balance::new(value)
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 - amount.minor_units())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(100).unwrap();
        assert_eq!(amount.minor_units(), 100);
    }

    #[test]
    fn test_amount_zero_rejected() {
        assert!(matches!(Amount::new(0), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        assert!(matches!(Amount::new(-5), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_overflow() {
        assert_eq!(Amount::new(MAX_MINOR_UNITS + 1), Err(AmountError::Overflow));
        assert!(Amount::new(MAX_MINOR_UNITS).is_ok());
    }

    #[test]
    fn test_from_major_converts_to_minor_units() {
        assert_eq!(Amount::from_major(dec!(10.50), 2).unwrap().minor_units(), 1050);
        assert_eq!(Amount::from_major(dec!(4), 2).unwrap().minor_units(), 400);
        assert_eq!(Amount::from_major(dec!(147), 0).unwrap().minor_units(), 147);
    }

    #[test]
    fn test_from_major_ignores_trailing_zeros() {
        // 1.2000 carries scale 4 but only one significant decimal place
        assert_eq!(Amount::from_major(dec!(1.2000), 2).unwrap().minor_units(), 120);
    }

    #[test]
    fn test_from_major_too_many_decimals() {
        let result = Amount::from_major(dec!(0.001), 2);
        assert_eq!(result, Err(AmountError::TooManyDecimals { max: 2, got: 3 }));
    }

    #[test]
    fn test_from_major_rejects_non_positive() {
        assert!(matches!(
            Amount::from_major(dec!(0), 2),
            Err(AmountError::NotPositive(_))
        ));
        assert!(matches!(
            Amount::from_major(dec!(-1.5), 2),
            Err(AmountError::NotPositive(_))
        ));
    }

    #[test]
    fn test_from_major_rejects_large_scale() {
        assert_eq!(
            Amount::from_major(dec!(1), 12),
            Err(AmountError::InvalidScale(12))
        );
    }

    #[test]
    fn test_to_major() {
        let amount = Amount::new(1050).unwrap();
        assert_eq!(amount.to_major(2), dec!(10.50));
        assert_eq!(minor_to_major(14749, 2), dec!(147.49));
    }

    #[test]
    fn test_amount_deserialize_validates() {
        let ok: Amount = serde_json::from_str("250").unwrap();
        assert_eq!(ok.minor_units(), 250);
        assert!(serde_json::from_str::<Amount>("0").is_err());
    }

    #[test]
    fn test_balance_credit_debit() {
        let balance = Balance::zero();
        let balance = balance.credit(&Amount::new(100).unwrap()).unwrap();
        assert_eq!(balance.minor_units(), 100);

        let balance = balance.debit(&Amount::new(30).unwrap()).unwrap();
        assert_eq!(balance.minor_units(), 70);
    }

    #[test]
    fn test_balance_insufficient() {
        let balance = Balance::new(50).unwrap();
        let amount = Amount::new(100).unwrap();

        assert!(!balance.is_sufficient_for(&amount));
        assert!(matches!(
            balance.debit(&amount),
            Err(AmountError::NotPositive(_))
        ));
    }
}
