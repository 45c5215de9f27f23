//! Wallet ledger entry point
//!
//! Bundles the handlers over one store, converts boundary requests to
//! minor units and retries whole operations on storage contention.

use std::sync::Arc;
use tracing::Instrument;

use crate::audit::{self, ReconciliationReport};
use crate::config::Config;
use crate::converter::RateTable;
use crate::domain::{LedgerEntry, OperationContext, UserId, Wallet, WalletId, WalletWithBalances};
use crate::error::LedgerResult;
use crate::handlers::{
    BalanceReceipt, BalanceRequest, DepositCommand, DepositHandler, Processed, RetryPolicy,
    TransferCommand, TransferHandler, TransferReceipt, TransferRequest, WalletHandler,
    WithdrawCommand, WithdrawHandler,
};
use crate::store::LedgerStore;

/// Default number of decimal places between major and minor units
pub const DEFAULT_MINOR_UNIT_SCALE: u32 = 2;

#[derive(Clone)]
pub struct WalletLedger<S> {
    store: S,
    transfers: TransferHandler<S>,
    deposits: DepositHandler<S>,
    withdrawals: WithdrawHandler<S>,
    wallets: WalletHandler<S>,
    retry: RetryPolicy,
    scale: u32,
}

impl<S: LedgerStore> WalletLedger<S> {
    pub fn new(store: S, rates: RateTable) -> Self {
        Self {
            transfers: TransferHandler::new(store.clone(), Arc::new(rates)),
            deposits: DepositHandler::new(store.clone()),
            withdrawals: WithdrawHandler::new(store.clone()),
            wallets: WalletHandler::new(store.clone()),
            store,
            retry: RetryPolicy::default(),
            scale: DEFAULT_MINOR_UNIT_SCALE,
        }
    }

    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store, config.exchange_rates.clone())
            .with_retry(RetryPolicy::new(
                config.transfer_max_retries,
                config.transfer_retry_backoff,
            ))
            .with_scale(config.minor_unit_scale)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    pub async fn create_wallet(&self, user_id: UserId, name: &str) -> LedgerResult<Wallet> {
        self.wallets.create(user_id, name).await
    }

    pub async fn wallet(&self, wallet_id: WalletId) -> LedgerResult<WalletWithBalances> {
        self.wallets.get(wallet_id).await
    }

    pub async fn history(&self, wallet_id: WalletId, limit: i64) -> LedgerResult<Vec<LedgerEntry>> {
        self.wallets.history(wallet_id, limit).await
    }

    // =========================================================================
    // Money movement
    // =========================================================================

    /// Deposit a decimal major-unit amount
    pub async fn deposit(
        &self,
        request: BalanceRequest,
        context: &OperationContext,
    ) -> LedgerResult<Processed<BalanceReceipt>> {
        let command = request.into_command(self.scale)?;
        self.deposit_command(&command, context).await
    }

    pub async fn deposit_command(
        &self,
        command: &DepositCommand,
        context: &OperationContext,
    ) -> LedgerResult<Processed<BalanceReceipt>> {
        let context = with_correlation(context);
        let span = operation_span("deposit", &command.reference, &context);
        self.retry
            .run("deposit", || self.deposits.execute(command, &context))
            .instrument(span)
            .await
    }

    /// Withdraw a decimal major-unit amount
    pub async fn withdraw(
        &self,
        request: BalanceRequest,
        context: &OperationContext,
    ) -> LedgerResult<Processed<BalanceReceipt>> {
        let command = request.into_command(self.scale)?;
        self.withdraw_command(&command, context).await
    }

    pub async fn withdraw_command(
        &self,
        command: &WithdrawCommand,
        context: &OperationContext,
    ) -> LedgerResult<Processed<BalanceReceipt>> {
        let context = with_correlation(context);
        let span = operation_span("withdraw", &command.reference, &context);
        self.retry
            .run("withdraw", || self.withdrawals.execute(command, &context))
            .instrument(span)
            .await
    }

    /// Transfer a decimal major-unit amount of the source currency
    pub async fn transfer(
        &self,
        request: TransferRequest,
        context: &OperationContext,
    ) -> LedgerResult<Processed<TransferReceipt>> {
        let command = request.into_command(self.scale)?;
        self.transfer_command(&command, context).await
    }

    pub async fn transfer_command(
        &self,
        command: &TransferCommand,
        context: &OperationContext,
    ) -> LedgerResult<Processed<TransferReceipt>> {
        let context = with_correlation(context);
        let span = operation_span("transfer", &command.reference, &context);
        self.retry
            .run("transfer", || self.transfers.execute(command, &context))
            .instrument(span)
            .await
    }

    // =========================================================================
    // Audit
    // =========================================================================

    pub async fn reconcile(&self) -> LedgerResult<ReconciliationReport> {
        audit::reconcile(&self.store).await
    }
}

fn with_correlation(context: &OperationContext) -> OperationContext {
    let mut context = context.clone();
    context.ensure_correlation_id();
    context
}

fn operation_span(operation: &str, reference: &str, context: &OperationContext) -> tracing::Span {
    tracing::info_span!(
        "ledger_operation",
        operation,
        reference,
        correlation_id = ?context.correlation_id,
        request_user_id = ?context.request_user_id,
    )
}
