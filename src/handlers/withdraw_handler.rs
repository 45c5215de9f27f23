//! Withdraw Handler

use crate::domain::OperationContext;
use crate::error::LedgerResult;
use crate::store::LedgerStore;

use super::adjustment::{adjust_balance, Direction};
use super::{BalanceReceipt, Processed, WithdrawCommand};

/// Handler for withdrawals. Never drives a balance below zero.
#[derive(Clone)]
pub struct WithdrawHandler<S> {
    store: S,
}

impl<S: LedgerStore> WithdrawHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        command: &WithdrawCommand,
        context: &OperationContext,
    ) -> LedgerResult<Processed<BalanceReceipt>> {
        adjust_balance(&self.store, Direction::Debit, command, context).await
    }
}
