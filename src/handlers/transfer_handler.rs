//! Transfer Handler
//!
//! Transfer Coordinator: moves value between two balances inside one unit
//! of work, converting across currencies and detecting idempotent
//! retries.

use serde_json::json;
use std::fmt;
use std::sync::Arc;

use crate::converter::RateTable;
use crate::domain::{Balance, EntryType, NewLedgerEntry, OperationContext};
use crate::error::{LedgerError, LedgerResult};
use crate::idempotency::{IdempotencyRecord, OperationKind, RequestFingerprint};
use crate::store::{LedgerStore, UnitOfWork};

use super::ledger_writer::LedgerWriter;
use super::locking::lock_in_canonical_order;
use super::{Processed, TransferCommand, TransferReceipt, TransferStatus};

/// Progress of one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Started,
    IdempotencyChecked,
    BalancesLocked,
    Validated,
    Mutated,
    LedgerWritten,
    Committed,
    Aborted,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Committed | TransferState::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Started => "started",
            TransferState::IdempotencyChecked => "idempotency_checked",
            TransferState::BalancesLocked => "balances_locked",
            TransferState::Validated => "validated",
            TransferState::Mutated => "mutated",
            TransferState::LedgerWritten => "ledger_written",
            TransferState::Committed => "committed",
            TransferState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the state of one attempt for logging and failure reports
struct Attempt<'a> {
    reference: &'a str,
    state: TransferState,
}

impl<'a> Attempt<'a> {
    fn advance(&mut self, next: TransferState) {
        tracing::trace!(
            reference = self.reference,
            from = %self.state,
            to = %next,
            "Transfer state transition"
        );
        self.state = next;
    }
}

enum Step {
    Replayed(TransferReceipt),
    Applied(TransferReceipt),
}

/// Handler for transfers between balances
#[derive(Clone)]
pub struct TransferHandler<S> {
    store: S,
    rates: Arc<RateTable>,
}

impl<S: LedgerStore> TransferHandler<S> {
    pub fn new(store: S, rates: Arc<RateTable>) -> Self {
        Self { store, rates }
    }

    /// Execute the transfer command as one unit of work
    pub async fn execute(
        &self,
        command: &TransferCommand,
        context: &OperationContext,
    ) -> LedgerResult<Processed<TransferReceipt>> {
        // Also enforced by TransferCommand::new; fields are public
        if command.source() == command.destination() {
            return Err(LedgerError::InvalidTarget);
        }

        let fingerprint = RequestFingerprint::of(command)?;
        let mut attempt = Attempt {
            reference: &command.reference,
            state: TransferState::Started,
        };

        let mut uow = self.store.begin().await?;
        let step = self
            .run(&mut uow, command, &fingerprint, context, &mut attempt)
            .await;

        match step {
            Ok(Step::Replayed(receipt)) => {
                uow.rollback().await?;
                tracing::info!(
                    reference = %command.reference,
                    "Transfer already processed, replaying recorded outcome"
                );
                Ok(Processed::replayed(receipt))
            }
            Ok(Step::Applied(receipt)) => {
                if let Err(e) = uow.commit().await {
                    attempt.advance(TransferState::Aborted);
                    return Err(e.into());
                }
                attempt.advance(TransferState::Committed);
                tracing::info!(
                    reference = %command.reference,
                    from = %command.source(),
                    to = %command.destination(),
                    debited = receipt.debited(),
                    credited = receipt.credited(),
                    "Transfer committed"
                );
                Ok(Processed::fresh(receipt))
            }
            Err(e) => {
                let failed_in = attempt.state;
                attempt.advance(TransferState::Aborted);
                if let Err(rollback_err) = uow.rollback().await {
                    tracing::error!(
                        reference = %command.reference,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                tracing::warn!(
                    reference = %command.reference,
                    state = %failed_in,
                    error_code = e.error_code(),
                    error = %e,
                    "Transfer aborted"
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        uow: &mut S::UnitOfWork,
        command: &TransferCommand,
        fingerprint: &RequestFingerprint,
        context: &OperationContext,
        attempt: &mut Attempt<'_>,
    ) -> LedgerResult<Step> {
        if let Some(record) = LedgerWriter::find_completed(
            uow,
            &command.reference,
            OperationKind::Transfer,
            fingerprint,
        )
        .await?
        {
            return Ok(Step::Replayed(record.outcome(&command.reference)?));
        }
        LedgerWriter::ensure_unclaimed(uow, &[command.out_reference(), command.in_reference()])
            .await?;
        attempt.advance(TransferState::IdempotencyChecked);

        let source = command.source();
        let destination = command.destination();
        let locked = lock_in_canonical_order(uow, &[source.clone(), destination.clone()]).await?;
        attempt.advance(TransferState::BalancesLocked);

        // Matched by key, not by lock position
        let amount = command.amount.minor_units();
        let available = Balance::new(locked.get(&source).copied().unwrap_or(0))?;
        if !available.is_sufficient_for(&command.amount) {
            return Err(LedgerError::InsufficientFunds {
                wallet_id: source.wallet_id,
                currency: source.currency.clone(),
                required: amount,
                available: available.minor_units(),
            });
        }
        attempt.advance(TransferState::Validated);

        let from_balance = uow.apply_delta(&source, -amount).await?;

        let conversion = self
            .rates
            .convert(amount, &command.from_currency, &command.to_currency)?;
        if conversion.converted == 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "{} {} converts to zero {}",
                amount, command.from_currency, command.to_currency
            )));
        }

        let to_balance = uow.apply_delta(&destination, conversion.converted).await?;
        attempt.advance(TransferState::Mutated);

        LedgerWriter::append(
            uow,
            NewLedgerEntry::new(
                command.from_wallet_id,
                EntryType::TransferOut,
                command.from_currency.clone(),
                amount,
            )
            .with_reference(command.out_reference())
            .with_meta(json!({
                "transfer": command.reference,
                "counterparty_wallet_id": command.to_wallet_id,
            })),
        )
        .await?;

        LedgerWriter::append(
            uow,
            NewLedgerEntry::new(
                command.to_wallet_id,
                EntryType::TransferIn,
                command.to_currency.clone(),
                conversion.converted,
            )
            .with_reference(command.in_reference())
            .with_meta(json!({
                "transfer": command.reference,
                "counterparty_wallet_id": command.from_wallet_id,
            })),
        )
        .await?;

        let receipt = TransferReceipt {
            status: TransferStatus::Completed,
            reference: command.reference.clone(),
            from_wallet_id: command.from_wallet_id,
            to_wallet_id: command.to_wallet_id,
            conversion,
            from_balance,
            to_balance,
        };

        let record = IdempotencyRecord::new(
            OperationKind::Transfer,
            fingerprint.clone(),
            &receipt,
            context,
        )?;
        LedgerWriter::append(
            uow,
            NewLedgerEntry::new(
                command.from_wallet_id,
                EntryType::Meta,
                command.from_currency.clone(),
                0,
            )
            .with_reference(command.reference.clone())
            .with_meta(record.to_meta()?),
        )
        .await?;
        attempt.advance(TransferState::LedgerWritten);

        Ok(Step::Applied(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TransferState::Committed.is_terminal());
        assert!(TransferState::Aborted.is_terminal());
        for state in [
            TransferState::Started,
            TransferState::IdempotencyChecked,
            TransferState::BalancesLocked,
            TransferState::Validated,
            TransferState::Mutated,
            TransferState::LedgerWritten,
        ] {
            assert!(!state.is_terminal(), "{state} should not be terminal");
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TransferState::BalancesLocked.to_string(), "balances_locked");
    }
}
