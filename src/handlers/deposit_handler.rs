//! Deposit Handler
//!
//! Credits a single balance, creating it on first touch.

use crate::domain::OperationContext;
use crate::error::LedgerResult;
use crate::store::LedgerStore;

use super::adjustment::{adjust_balance, Direction};
use super::{BalanceReceipt, DepositCommand, Processed};

/// Handler for deposits
#[derive(Clone)]
pub struct DepositHandler<S> {
    store: S,
}

impl<S: LedgerStore> DepositHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Execute the deposit command; the receipt carries the new balance
    pub async fn execute(
        &self,
        command: &DepositCommand,
        context: &OperationContext,
    ) -> LedgerResult<Processed<BalanceReceipt>> {
        adjust_balance(&self.store, Direction::Credit, command, context).await
    }
}
