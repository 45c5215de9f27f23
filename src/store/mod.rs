//! Balance store and ledger writer persistence
//!
//! A [`LedgerStore`] hands out [`UnitOfWork`]s: one atomic transaction in
//! which balance rows are locked, mutated and ledger entries appended.
//! Nothing written through a unit of work is visible to others until
//! [`UnitOfWork::commit`]; dropping it without committing rolls back.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::{
    BalanceKey, LedgerEntry, NewLedgerEntry, UserId, Wallet, WalletBalance, WalletId,
};

pub use error::StoreError;
pub use memory::{MemoryLedgerStore, MemoryUnitOfWork};
pub use postgres::{PgLedgerStore, PgUnitOfWork};

/// One atomic unit of work against the balance store and the ledger.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Take an exclusive lock on a balance row until the unit of work
    /// ends. Returns `None` when the row does not exist yet. Locking a key
    /// twice in the same unit of work does not block.
    async fn lock_balance(&mut self, key: &BalanceKey) -> Result<Option<i64>, StoreError>;

    /// Insert the balance row if missing. Returns `false` when it already
    /// existed (including when a concurrent unit of work created it first).
    async fn create_if_absent(
        &mut self,
        key: &BalanceKey,
        initial_amount: i64,
    ) -> Result<bool, StoreError>;

    /// Add a signed delta to an existing, locked balance and return the
    /// new amount. Fails with `InsufficientFunds` instead of going negative.
    async fn apply_delta(&mut self, key: &BalanceKey, delta: i64) -> Result<i64, StoreError>;

    /// Ledger entry recorded under exactly this reference, if any
    async fn find_by_reference(
        &mut self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    /// Append an immutable ledger entry as part of this unit of work
    async fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Durable wallet, balance and ledger storage
#[async_trait]
pub trait LedgerStore: Clone + Send + Sync + 'static {
    type UnitOfWork: UnitOfWork + 'static;

    async fn begin(&self) -> Result<Self::UnitOfWork, StoreError>;

    async fn create_wallet(&self, user_id: UserId, name: &str) -> Result<Wallet, StoreError>;

    async fn find_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>, StoreError>;

    /// Committed balances of one wallet, ordered by currency
    async fn balances(&self, wallet_id: WalletId) -> Result<Vec<WalletBalance>, StoreError>;

    /// Every committed balance, in canonical key order
    async fn all_balances(&self) -> Result<Vec<WalletBalance>, StoreError>;

    /// Most recent ledger entries of a wallet, newest first
    async fn entries(&self, wallet_id: WalletId, limit: i64)
        -> Result<Vec<LedgerEntry>, StoreError>;

    /// Signed sum of ledger entries per balance key
    async fn ledger_totals(&self) -> Result<Vec<(BalanceKey, i64)>, StoreError>;
}
