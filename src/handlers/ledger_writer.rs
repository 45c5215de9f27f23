//! Ledger Writer
//!
//! Appends immutable entries and answers the idempotency question, always
//! inside the caller's unit of work. It never commits on its own.

use crate::domain::{LedgerEntry, NewLedgerEntry};
use crate::error::{LedgerError, LedgerResult};
use crate::idempotency::{IdempotencyRecord, OperationKind, RequestFingerprint};
use crate::store::UnitOfWork;

pub struct LedgerWriter;

impl LedgerWriter {
    /// Whether an entry already carries `reference`
    pub async fn has_completed<U: UnitOfWork>(uow: &mut U, reference: &str) -> LedgerResult<bool> {
        Ok(uow.find_by_reference(reference).await?.is_some())
    }

    /// Previous outcome recorded under `reference`, checked against the
    /// current request. A reference reused for a different request is an
    /// `IdempotencyConflict`.
    pub async fn find_completed<U: UnitOfWork>(
        uow: &mut U,
        reference: &str,
        kind: OperationKind,
        fingerprint: &RequestFingerprint,
    ) -> LedgerResult<Option<IdempotencyRecord>> {
        let Some(entry) = uow.find_by_reference(reference).await? else {
            return Ok(None);
        };

        let record = IdempotencyRecord::from_entry(reference, &entry)?;
        record.verify(reference, kind, fingerprint)?;
        Ok(Some(record))
    }

    /// Fail when any of `references` is already held by another operation
    pub async fn ensure_unclaimed<U: UnitOfWork>(
        uow: &mut U,
        references: &[String],
    ) -> LedgerResult<()> {
        for reference in references {
            if Self::has_completed(uow, reference).await? {
                return Err(LedgerError::IdempotencyConflict {
                    reference: reference.clone(),
                });
            }
        }
        Ok(())
    }

    pub async fn append<U: UnitOfWork>(
        uow: &mut U,
        entry: NewLedgerEntry,
    ) -> LedgerResult<LedgerEntry> {
        let entry = uow.append(entry).await?;
        tracing::debug!(
            entry_id = entry.id,
            wallet_id = %entry.wallet_id,
            entry_type = %entry.entry_type,
            currency = %entry.currency,
            amount = entry.amount,
            reference = entry.reference.as_deref().unwrap_or(""),
            "Ledger entry appended"
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CurrencyCode, EntryType, OperationContext, UserId};
    use crate::store::{LedgerStore, MemoryLedgerStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_find_completed_replays_and_detects_conflicts() {
        let store = MemoryLedgerStore::new();
        let wallet = store.create_wallet(UserId(1), "main").await.unwrap().id;
        let fingerprint = RequestFingerprint::compute(b"deposit 100");
        let record = IdempotencyRecord::new(
            OperationKind::Deposit,
            fingerprint.clone(),
            &json!({"new_amount": 100}),
            &OperationContext::new(),
        )
        .unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(!LedgerWriter::has_completed(&mut uow, "dep-1").await.unwrap());
        let entry = NewLedgerEntry::new(wallet, EntryType::Deposit, CurrencyCode::new("USD").unwrap(), 100)
            .with_reference("dep-1")
            .with_meta(record.to_meta().unwrap());
        LedgerWriter::append(&mut uow, entry).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let found = LedgerWriter::find_completed(&mut uow, "dep-1", OperationKind::Deposit, &fingerprint)
            .await
            .unwrap();
        assert_eq!(found, Some(record));

        let err = LedgerWriter::find_completed(&mut uow, "dep-1", OperationKind::Withdraw, &fingerprint)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::IdempotencyConflict { .. }));

        let err = LedgerWriter::ensure_unclaimed(&mut uow, &["dep-1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::IdempotencyConflict { reference } if reference == "dep-1"));
    }
}
