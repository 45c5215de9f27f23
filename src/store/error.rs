//! Store Errors
//!
//! Error types for balance store and ledger writer operations.

use crate::domain::{BalanceKey, WalletId};

/// Postgres SQLSTATE codes the store treats specially
mod sqlstate {
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
}

/// Errors that can occur inside a unit of work
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lock wait exceeded the configured timeout
    #[error("Lock wait timed out on balance {0}")]
    LockTimeout(String),

    /// Serialization failure or deadlock reported by the database
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Another unit of work already recorded this reference
    #[error("Reference already recorded: {0}")]
    DuplicateReference(String),

    /// Applying a delta would make the balance negative
    #[error("Insufficient funds on {key}: required {required}, available {available}")]
    InsufficientFunds {
        key: BalanceKey,
        required: i64,
        available: i64,
    },

    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("Balance {0} does not exist")]
    MissingBalance(BalanceKey),

    #[error("Balance {0} is not locked by this unit of work")]
    NotLocked(BalanceKey),

    #[error("Balance {0} would overflow")]
    Overflow(BalanceKey),

    /// Persisted row could not be decoded
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Contention errors: the whole operation may be retried safely
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::LockTimeout(_) | StoreError::Conflict(_) | StoreError::DuplicateReference(_)
        )
    }

    /// Map a foreign key violation onto the wallet it references
    pub(crate) fn for_wallet(err: sqlx::Error, wallet_id: WalletId) -> Self {
        if sqlstate_of(&err).as_deref() == Some(sqlstate::FOREIGN_KEY_VIOLATION) {
            return StoreError::WalletNotFound(wallet_id);
        }
        StoreError::from(err)
    }
}

fn sqlstate_of(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match sqlstate_of(&err).as_deref() {
            Some(sqlstate::SERIALIZATION_FAILURE) | Some(sqlstate::DEADLOCK_DETECTED) => {
                StoreError::Conflict(err.to_string())
            }
            Some(sqlstate::LOCK_NOT_AVAILABLE) => StoreError::LockTimeout(err.to_string()),
            Some(sqlstate::UNIQUE_VIOLATION) => StoreError::DuplicateReference(err.to_string()),
            _ => StoreError::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CurrencyCode;

    #[test]
    fn test_store_error_is_retryable() {
        assert!(StoreError::LockTimeout("1/USD".into()).is_retryable());
        assert!(StoreError::Conflict("could not serialize".into()).is_retryable());
        assert!(StoreError::DuplicateReference("r1".into()).is_retryable());

        let key = crate::domain::BalanceKey::new(WalletId(1), CurrencyCode::new("USD").unwrap());
        let insufficient = StoreError::InsufficientFunds {
            key,
            required: 10,
            available: 5,
        };
        assert!(!insufficient.is_retryable());
        assert!(!StoreError::WalletNotFound(WalletId(9)).is_retryable());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn test_non_database_errors_pass_through() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Database(sqlx::Error::PoolTimedOut)));

        let err = StoreError::for_wallet(sqlx::Error::RowNotFound, WalletId(3));
        assert!(matches!(err, StoreError::Database(_)));
    }
}
