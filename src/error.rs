//! Error handling module
//!
//! Centralized error type returned by every ledger operation.

use serde::Serialize;

use crate::converter::ConversionError;
use crate::domain::{AmountError, CurrencyCode, CurrencyError, WalletId};
use crate::idempotency::IdempotencyError;
use crate::store::StoreError;

/// Ledger-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // Rejections: nothing was persisted
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid target: source and destination are the same balance")]
    InvalidTarget,

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error(
        "Insufficient funds in wallet {wallet_id} ({currency}): required {required}, available {available}"
    )]
    InsufficientFunds {
        wallet_id: WalletId,
        currency: CurrencyCode,
        required: i64,
        available: i64,
    },

    #[error("Unsupported conversion {from} -> {to}")]
    UnsupportedConversion { from: CurrencyCode, to: CurrencyCode },

    #[error("Idempotency conflict: reference {reference} was used for a different request")]
    IdempotencyConflict { reference: String },

    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    // Storage
    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

/// Error body handed to collaborators (HTTP layer, job runners)
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl LedgerError {
    /// Stable snake_case code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidRequest(_) => "invalid_request",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::InvalidTarget => "invalid_target",
            LedgerError::InvalidCurrency(_) => "invalid_currency",
            LedgerError::InvalidReference(_) => "invalid_reference",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::UnsupportedConversion { .. } => "unsupported_conversion",
            LedgerError::IdempotencyConflict { .. } => "idempotency_conflict",
            LedgerError::WalletNotFound(_) => "wallet_not_found",
            LedgerError::StorageConflict(_) => "storage_conflict",
            LedgerError::StorageFailure(_) => "storage_failure",
        }
    }

    /// Caused by the request itself; retrying it unchanged cannot succeed
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            LedgerError::StorageConflict(_) | LedgerError::StorageFailure(_)
        )
    }

    /// Transient contention; the whole operation may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageConflict(_))
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout(_)
            | StoreError::Conflict(_)
            | StoreError::DuplicateReference(_) => LedgerError::StorageConflict(err.to_string()),
            StoreError::InsufficientFunds {
                key,
                required,
                available,
            } => LedgerError::InsufficientFunds {
                wallet_id: key.wallet_id,
                currency: key.currency,
                required,
                available,
            },
            StoreError::WalletNotFound(wallet_id) => LedgerError::WalletNotFound(wallet_id),
            StoreError::Overflow(key) => {
                LedgerError::InvalidAmount(format!("balance {} would overflow", key))
            }
            other => {
                tracing::error!(error = %other, "Storage failure");
                LedgerError::StorageFailure(other.to_string())
            }
        }
    }
}

impl From<IdempotencyError> for LedgerError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::Taken(reference)
            | IdempotencyError::FingerprintMismatch(reference)
            | IdempotencyError::KindMismatch { reference, .. } => {
                LedgerError::IdempotencyConflict { reference }
            }
            other => {
                tracing::error!(error = %other, "Idempotency record unusable");
                LedgerError::StorageFailure(other.to_string())
            }
        }
    }
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        LedgerError::InvalidAmount(err.to_string())
    }
}

impl From<CurrencyError> for LedgerError {
    fn from(err: CurrencyError) -> Self {
        LedgerError::InvalidCurrency(err.0)
    }
}

impl From<ConversionError> for LedgerError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::Unsupported { from, to } => {
                LedgerError::UnsupportedConversion { from, to }
            }
            ConversionError::Overflow { .. } => LedgerError::InvalidAmount(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BalanceKey;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    #[test]
    fn test_contention_maps_to_storage_conflict() {
        for err in [
            StoreError::LockTimeout("1/USD".into()),
            StoreError::Conflict("deadlock detected".into()),
            StoreError::DuplicateReference("r1-out".into()),
        ] {
            let err = LedgerError::from(err);
            assert!(matches!(err, LedgerError::StorageConflict(_)));
            assert!(err.is_retryable());
            assert!(!err.is_client_error());
        }
    }

    #[test]
    fn test_insufficient_funds_keeps_balance_identity() {
        let err = LedgerError::from(StoreError::InsufficientFunds {
            key: BalanceKey::new(WalletId(1), usd()),
            required: 700,
            available: 600,
        });
        match err {
            LedgerError::InsufficientFunds {
                wallet_id,
                currency,
                required,
                available,
            } => {
                assert_eq!(wallet_id, WalletId(1));
                assert_eq!(currency, usd());
                assert_eq!((required, available), (700, 600));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_other_store_errors_are_failures() {
        let err = LedgerError::from(StoreError::CorruptRow("bad type".into()));
        assert_eq!(err.error_code(), "storage_failure");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_conversion_errors() {
        let jpy = CurrencyCode::new("JPY").unwrap();
        let err = LedgerError::from(ConversionError::Unsupported {
            from: jpy.clone(),
            to: usd(),
        });
        assert_eq!(err.error_code(), "unsupported_conversion");
        assert!(err.is_client_error());
        assert!(err.to_string().contains("JPY -> USD"));
    }

    #[test]
    fn test_error_response() {
        let response = LedgerError::InvalidTarget.to_response();
        assert_eq!(response.error_code, "invalid_target");
        assert!(response.error.contains("same balance"));
    }
}
