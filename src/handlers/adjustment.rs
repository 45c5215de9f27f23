//! Single-balance adjustments shared by deposits and withdrawals

use crate::domain::{Balance, EntryType, NewLedgerEntry, OperationContext};
use crate::error::{LedgerError, LedgerResult};
use crate::idempotency::{IdempotencyRecord, OperationKind, RequestFingerprint};
use crate::store::{LedgerStore, UnitOfWork};

use super::ledger_writer::LedgerWriter;
use super::locking::lock_in_canonical_order;
use super::{BalanceCommand, BalanceReceipt, Processed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Credit,
    Debit,
}

impl Direction {
    fn kind(self) -> OperationKind {
        match self {
            Direction::Credit => OperationKind::Deposit,
            Direction::Debit => OperationKind::Withdraw,
        }
    }

    fn entry_type(self) -> EntryType {
        match self {
            Direction::Credit => EntryType::Deposit,
            Direction::Debit => EntryType::Withdraw,
        }
    }
}

enum Step {
    Replayed(BalanceReceipt),
    Applied(BalanceReceipt),
}

pub(crate) async fn adjust_balance<S: LedgerStore>(
    store: &S,
    direction: Direction,
    command: &BalanceCommand,
    context: &OperationContext,
) -> LedgerResult<Processed<BalanceReceipt>> {
    let kind = direction.kind();
    let fingerprint = RequestFingerprint::of(command)?;

    let mut uow = store.begin().await?;
    match apply(&mut uow, direction, command, &fingerprint, context).await {
        Ok(Step::Replayed(receipt)) => {
            uow.rollback().await?;
            tracing::info!(
                reference = %command.reference,
                operation = %kind,
                "Already processed, replaying recorded outcome"
            );
            Ok(Processed::replayed(receipt))
        }
        Ok(Step::Applied(receipt)) => {
            uow.commit().await?;
            tracing::info!(
                reference = %command.reference,
                operation = %kind,
                balance = %command.key(),
                amount = receipt.amount,
                new_amount = receipt.new_amount,
                "Balance adjusted"
            );
            Ok(Processed::fresh(receipt))
        }
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::error!(error = %rollback_err, "Rollback failed");
            }
            tracing::warn!(
                reference = %command.reference,
                operation = %kind,
                error_code = e.error_code(),
                error = %e,
                "Balance adjustment rejected"
            );
            Err(e)
        }
    }
}

async fn apply<U: UnitOfWork>(
    uow: &mut U,
    direction: Direction,
    command: &BalanceCommand,
    fingerprint: &RequestFingerprint,
    context: &OperationContext,
) -> LedgerResult<Step> {
    let kind = direction.kind();
    if let Some(record) =
        LedgerWriter::find_completed(uow, &command.reference, kind, fingerprint).await?
    {
        return Ok(Step::Replayed(record.outcome(&command.reference)?));
    }

    let key = command.key();
    let locked = lock_in_canonical_order(uow, std::slice::from_ref(&key)).await?;
    let available = Balance::new(locked.get(&key).copied().unwrap_or(0))?;
    let amount = command.amount.minor_units();

    let delta = match direction {
        Direction::Credit => {
            available.credit(&command.amount)?;
            amount
        }
        Direction::Debit => {
            if !available.is_sufficient_for(&command.amount) {
                return Err(LedgerError::InsufficientFunds {
                    wallet_id: key.wallet_id,
                    currency: key.currency.clone(),
                    required: amount,
                    available: available.minor_units(),
                });
            }
            -amount
        }
    };
    let new_amount = uow.apply_delta(&key, delta).await?;

    let receipt = BalanceReceipt {
        reference: command.reference.clone(),
        wallet_id: command.wallet_id,
        currency: command.currency.clone(),
        amount,
        new_amount,
    };
    let record = IdempotencyRecord::new(kind, fingerprint.clone(), &receipt, context)?;

    LedgerWriter::append(
        uow,
        NewLedgerEntry::new(
            command.wallet_id,
            direction.entry_type(),
            command.currency.clone(),
            amount,
        )
        .with_reference(command.reference.clone())
        .with_meta(record.to_meta()?),
    )
    .await?;

    Ok(Step::Applied(receipt))
}
