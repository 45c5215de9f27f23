//! Command definitions
//!
//! Requests arrive with decimal major-unit amounts and raw currency codes;
//! `into_command` validates them and converts to minor units so that the
//! handlers only ever see [`Amount`]s.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::converter::Conversion;
use crate::domain::{Amount, BalanceKey, CurrencyCode, WalletId};
use crate::error::{LedgerError, LedgerResult};
use crate::idempotency::validate_reference;

// =========================================================================
// Boundary requests
// =========================================================================

/// Transfer request as received from a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_wallet_id: i64,
    pub to_wallet_id: i64,
    pub from_currency: String,
    pub to_currency: String,
    /// Decimal amount in major units of `from_currency`
    pub amount: Decimal,
    pub reference: String,
}

impl TransferRequest {
    pub fn into_command(self, scale: u32) -> LedgerResult<TransferCommand> {
        TransferCommand::new(
            WalletId(self.from_wallet_id),
            WalletId(self.to_wallet_id),
            CurrencyCode::new(&self.from_currency)?,
            CurrencyCode::new(&self.to_currency)?,
            Amount::from_major(self.amount, scale)?,
            self.reference,
        )
    }
}

/// Deposit or withdrawal request as received from a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceRequest {
    pub wallet_id: i64,
    pub currency: String,
    /// Decimal amount in major units
    pub amount: Decimal,
    pub reference: String,
}

impl BalanceRequest {
    pub fn into_command(self, scale: u32) -> LedgerResult<BalanceCommand> {
        BalanceCommand::new(
            WalletId(self.wallet_id),
            CurrencyCode::new(&self.currency)?,
            Amount::from_major(self.amount, scale)?,
            self.reference,
        )
    }
}

// =========================================================================
// Commands
// =========================================================================

/// Move value from one balance to another, converting when the currencies
/// differ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_wallet_id: WalletId,
    pub to_wallet_id: WalletId,
    pub from_currency: CurrencyCode,
    pub to_currency: CurrencyCode,
    /// Minor units of `from_currency`
    pub amount: Amount,
    pub reference: String,
}

impl TransferCommand {
    pub fn new(
        from_wallet_id: WalletId,
        to_wallet_id: WalletId,
        from_currency: CurrencyCode,
        to_currency: CurrencyCode,
        amount: Amount,
        reference: impl Into<String>,
    ) -> LedgerResult<Self> {
        let reference = reference.into();
        validate_reference(&reference).map_err(LedgerError::InvalidReference)?;

        let command = Self {
            from_wallet_id,
            to_wallet_id,
            from_currency,
            to_currency,
            amount,
            reference,
        };
        if command.source() == command.destination() {
            return Err(LedgerError::InvalidTarget);
        }
        Ok(command)
    }

    pub fn source(&self) -> BalanceKey {
        BalanceKey::new(self.from_wallet_id, self.from_currency.clone())
    }

    pub fn destination(&self) -> BalanceKey {
        BalanceKey::new(self.to_wallet_id, self.to_currency.clone())
    }

    pub fn out_reference(&self) -> String {
        format!("{}-out", self.reference)
    }

    pub fn in_reference(&self) -> String {
        format!("{}-in", self.reference)
    }
}

/// Credit or debit a single balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCommand {
    pub wallet_id: WalletId,
    pub currency: CurrencyCode,
    pub amount: Amount,
    pub reference: String,
}

pub type DepositCommand = BalanceCommand;
pub type WithdrawCommand = BalanceCommand;

impl BalanceCommand {
    pub fn new(
        wallet_id: WalletId,
        currency: CurrencyCode,
        amount: Amount,
        reference: impl Into<String>,
    ) -> LedgerResult<Self> {
        let reference = reference.into();
        validate_reference(&reference).map_err(LedgerError::InvalidReference)?;
        Ok(Self {
            wallet_id,
            currency,
            amount,
            reference,
        })
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.wallet_id, self.currency.clone())
    }
}

// =========================================================================
// Results
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Completed,
}

/// Result of a committed transfer. All amounts are minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub status: TransferStatus,
    pub reference: String,
    pub from_wallet_id: WalletId,
    pub to_wallet_id: WalletId,
    /// Rate, exact product and truncated remainder
    pub conversion: Conversion,
    pub from_balance: i64,
    pub to_balance: i64,
}

impl TransferReceipt {
    pub fn debited(&self) -> i64 {
        self.conversion.amount
    }

    pub fn credited(&self) -> i64 {
        self.conversion.converted
    }
}

/// Result of a committed deposit or withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReceipt {
    pub reference: String,
    pub wallet_id: WalletId,
    pub currency: CurrencyCode,
    pub amount: i64,
    pub new_amount: i64,
}

/// Receipt plus whether it was replayed from an earlier attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processed<T> {
    #[serde(flatten)]
    pub receipt: T,
    pub replayed: bool,
}

impl<T> Processed<T> {
    pub fn fresh(receipt: T) -> Self {
        Self {
            receipt,
            replayed: false,
        }
    }

    pub fn replayed(receipt: T) -> Self {
        Self {
            receipt,
            replayed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> TransferRequest {
        TransferRequest {
            from_wallet_id: 1,
            to_wallet_id: 2,
            from_currency: "usd".to_string(),
            to_currency: "USD".to_string(),
            amount: dec!(4.00),
            reference: "r1".to_string(),
        }
    }

    #[test]
    fn test_transfer_request_into_command() {
        let command = request().into_command(2).unwrap();
        assert_eq!(command.amount.minor_units(), 400);
        assert_eq!(command.from_currency.as_str(), "USD");
        assert_eq!(command.out_reference(), "r1-out");
        assert_eq!(command.in_reference(), "r1-in");
    }

    #[test]
    fn test_self_transfer_is_invalid_target() {
        let mut req = request();
        req.to_wallet_id = 1;
        assert!(matches!(req.into_command(2), Err(LedgerError::InvalidTarget)));

        // Same wallet, different currency is a conversion, not a self-transfer
        let mut req = request();
        req.to_wallet_id = 1;
        req.to_currency = "JPY".to_string();
        assert!(req.into_command(2).is_ok());
    }

    #[test]
    fn test_request_validation() {
        let mut req = request();
        req.amount = dec!(0);
        assert!(matches!(req.into_command(2), Err(LedgerError::InvalidAmount(_))));

        let mut req = request();
        req.amount = dec!(1.005);
        assert!(matches!(req.into_command(2), Err(LedgerError::InvalidAmount(_))));

        let mut req = request();
        req.to_currency = "DOLLAR".to_string();
        assert!(matches!(req.into_command(2), Err(LedgerError::InvalidCurrency(_))));

        let mut req = request();
        req.reference = String::new();
        assert!(matches!(req.into_command(2), Err(LedgerError::InvalidReference(_))));
    }

    #[test]
    fn test_balance_request_into_command() {
        let req = BalanceRequest {
            wallet_id: 1,
            currency: "USD".to_string(),
            amount: dec!(10),
            reference: "dep-1".to_string(),
        };
        let command = req.into_command(2).unwrap();
        assert_eq!(command.amount.minor_units(), 1000);
        assert_eq!(command.key().to_string(), "1/USD");
    }

    #[test]
    fn test_processed_serializes_flat() {
        let receipt = BalanceReceipt {
            reference: "dep-1".to_string(),
            wallet_id: WalletId(1),
            currency: CurrencyCode::new("USD").unwrap(),
            amount: 1000,
            new_amount: 1000,
        };
        let json = serde_json::to_value(Processed::replayed(receipt)).unwrap();
        assert_eq!(json["new_amount"], 1000);
        assert_eq!(json["replayed"], true);
    }
}
