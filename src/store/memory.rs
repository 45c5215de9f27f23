//! In-memory store
//!
//! Same contract as the Postgres store, for tests and local runs. Each
//! balance key has its own async mutex standing in for a row lock; a unit
//! of work keeps the guards until it commits or is dropped. Balance
//! changes and entries are staged and only published on commit.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use crate::domain::{
    BalanceKey, LedgerEntry, NewLedgerEntry, UserId, Wallet, WalletBalance, WalletId,
};

use super::{LedgerStore, StoreError, UnitOfWork};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct MemoryState {
    wallets: BTreeMap<WalletId, Wallet>,
    next_wallet_id: i64,
    balances: BTreeMap<BalanceKey, i64>,
    entries: Vec<LedgerEntry>,
    references: HashSet<String>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<MemoryState>,
    row_locks: Mutex<HashMap<BalanceKey, Arc<tokio::sync::Mutex<()>>>>,
    next_entry_id: AtomicI64,
    lock_timeout: Duration,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, key: &BalanceKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.clone()).or_default().clone()
    }
}

/// Ledger store kept entirely in process memory
#[derive(Debug, Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(MemoryState {
                    next_wallet_id: 1,
                    ..MemoryState::default()
                }),
                row_locks: Mutex::new(HashMap::new()),
                next_entry_id: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }

    /// Committed amount of one balance, if the row exists
    pub fn balance(&self, key: &BalanceKey) -> Option<i64> {
        self.inner.state().balances.get(key).copied()
    }

    /// Number of committed ledger entries
    pub fn entry_count(&self) -> usize {
        self.inner.state().entries.len()
    }
}

/// Unit of work against a [`MemoryLedgerStore`]
pub struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    guards: HashMap<BalanceKey, OwnedMutexGuard<()>>,
    staged: HashMap<BalanceKey, i64>,
    entries: Vec<LedgerEntry>,
}

impl MemoryUnitOfWork {
    fn current(&self, key: &BalanceKey) -> Option<i64> {
        self.staged
            .get(key)
            .copied()
            .or_else(|| self.inner.state().balances.get(key).copied())
    }

    async fn acquire(&mut self, key: &BalanceKey) -> Result<(), StoreError> {
        if self.guards.contains_key(key) {
            return Ok(());
        }

        let lock = self.inner.row_lock(key);
        let guard = tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(key.to_string()))?;

        self.guards.insert(key.clone(), guard);
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_balance(&mut self, key: &BalanceKey) -> Result<Option<i64>, StoreError> {
        self.acquire(key).await?;
        Ok(self.current(key))
    }

    async fn create_if_absent(
        &mut self,
        key: &BalanceKey,
        initial_amount: i64,
    ) -> Result<bool, StoreError> {
        let wallet_exists = self.inner.state().wallets.contains_key(&key.wallet_id);
        if !wallet_exists {
            return Err(StoreError::WalletNotFound(key.wallet_id));
        }

        self.acquire(key).await?;
        if self.current(key).is_some() {
            return Ok(false);
        }

        self.staged.insert(key.clone(), initial_amount);
        Ok(true)
    }

    async fn apply_delta(&mut self, key: &BalanceKey, delta: i64) -> Result<i64, StoreError> {
        if !self.guards.contains_key(key) {
            return Err(StoreError::NotLocked(key.clone()));
        }

        let available = self
            .current(key)
            .ok_or_else(|| StoreError::MissingBalance(key.clone()))?;
        let updated = available
            .checked_add(delta)
            .ok_or_else(|| StoreError::Overflow(key.clone()))?;

        if updated < 0 {
            return Err(StoreError::InsufficientFunds {
                key: key.clone(),
                required: -delta,
                available,
            });
        }

        self.staged.insert(key.clone(), updated);
        Ok(updated)
    }

    async fn find_by_reference(
        &mut self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let own = self
            .entries
            .iter()
            .find(|e| e.reference.as_deref() == Some(reference))
            .cloned();
        if own.is_some() {
            return Ok(own);
        }

        let state = self.inner.state();
        Ok(state
            .entries
            .iter()
            .find(|e| e.reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        {
            let state = self.inner.state();
            if !state.wallets.contains_key(&entry.wallet_id) {
                return Err(StoreError::WalletNotFound(entry.wallet_id));
            }
            if let Some(reference) = entry.reference.as_deref() {
                let staged = self
                    .entries
                    .iter()
                    .any(|e| e.reference.as_deref() == Some(reference));
                if staged || state.references.contains(reference) {
                    return Err(StoreError::DuplicateReference(reference.to_string()));
                }
            }
        }

        let recorded = LedgerEntry {
            id: self.inner.next_entry_id.fetch_add(1, Ordering::SeqCst),
            wallet_id: entry.wallet_id,
            entry_type: entry.entry_type,
            currency: entry.currency,
            amount: entry.amount,
            reference: entry.reference,
            meta: entry.meta,
            created_at: Utc::now(),
        };
        self.entries.push(recorded.clone());
        Ok(recorded)
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self.inner.state();

        // A concurrent unit of work may have committed the same reference
        if let Some(reference) = self
            .entries
            .iter()
            .filter_map(|e| e.reference.as_deref())
            .find(|r| state.references.contains(*r))
        {
            return Err(StoreError::DuplicateReference(reference.to_string()));
        }

        for (key, amount) in &self.staged {
            state.balances.insert(key.clone(), *amount);
        }
        for entry in &self.entries {
            if let Some(reference) = &entry.reference {
                state.references.insert(reference.clone());
            }
            state.entries.push(entry.clone());
        }

        // Row guards are released when `self` drops after publishing
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type UnitOfWork = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork, StoreError> {
        Ok(MemoryUnitOfWork {
            inner: Arc::clone(&self.inner),
            guards: HashMap::new(),
            staged: HashMap::new(),
            entries: Vec::new(),
        })
    }

    async fn create_wallet(&self, user_id: UserId, name: &str) -> Result<Wallet, StoreError> {
        let mut state = self.inner.state();
        let id = WalletId(state.next_wallet_id);
        state.next_wallet_id += 1;

        let wallet = Wallet {
            id,
            user_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.wallets.insert(id, wallet.clone());
        Ok(wallet)
    }

    async fn find_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>, StoreError> {
        Ok(self.inner.state().wallets.get(&wallet_id).cloned())
    }

    async fn balances(&self, wallet_id: WalletId) -> Result<Vec<WalletBalance>, StoreError> {
        let state = self.inner.state();
        Ok(state
            .balances
            .iter()
            .filter(|(key, _)| key.wallet_id == wallet_id)
            .map(|(key, amount)| WalletBalance {
                wallet_id: key.wallet_id,
                currency: key.currency.clone(),
                amount: *amount,
            })
            .collect())
    }

    async fn all_balances(&self) -> Result<Vec<WalletBalance>, StoreError> {
        let state = self.inner.state();
        Ok(state
            .balances
            .iter()
            .map(|(key, amount)| WalletBalance {
                wallet_id: key.wallet_id,
                currency: key.currency.clone(),
                amount: *amount,
            })
            .collect())
    }

    async fn entries(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.inner.state();
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.wallet_id == wallet_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(entries)
    }

    async fn ledger_totals(&self) -> Result<Vec<(BalanceKey, i64)>, StoreError> {
        let state = self.inner.state();
        let mut totals: BTreeMap<BalanceKey, i64> = BTreeMap::new();
        for entry in &state.entries {
            let key = BalanceKey::new(entry.wallet_id, entry.currency.clone());
            *totals.entry(key).or_insert(0) += entry.signed_amount();
        }
        Ok(totals.into_iter().collect())
    }
}
