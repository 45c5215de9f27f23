//! Wallet Handler
//!
//! Wallet creation and read-side queries.

use crate::domain::{LedgerEntry, UserId, Wallet, WalletId, WalletWithBalances};
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

/// Upper bound on history page size
pub const MAX_HISTORY_LIMIT: i64 = 500;

const MAX_NAME_LEN: usize = 100;

/// Handler for wallet management
#[derive(Clone)]
pub struct WalletHandler<S> {
    store: S,
}

impl<S: LedgerStore> WalletHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create(&self, user_id: UserId, name: &str) -> LedgerResult<Wallet> {
        let name = name.trim();
        let name = if name.is_empty() { "Main" } else { name };
        if name.chars().count() > MAX_NAME_LEN {
            return Err(LedgerError::InvalidRequest(format!(
                "wallet name is longer than {} characters",
                MAX_NAME_LEN
            )));
        }

        let wallet = self.store.create_wallet(user_id, name).await?;
        tracing::info!(wallet_id = %wallet.id, user_id = user_id.0, "Wallet created");
        Ok(wallet)
    }

    /// Wallet with every balance it holds
    pub async fn get(&self, wallet_id: WalletId) -> LedgerResult<WalletWithBalances> {
        let wallet = self
            .store
            .find_wallet(wallet_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;
        let balances = self.store.balances(wallet_id).await?;

        Ok(WalletWithBalances { wallet, balances })
    }

    /// Ledger history of a wallet, newest first
    pub async fn history(&self, wallet_id: WalletId, limit: i64) -> LedgerResult<Vec<LedgerEntry>> {
        if self.store.find_wallet(wallet_id).await?.is_none() {
            return Err(LedgerError::WalletNotFound(wallet_id));
        }

        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.store.entries(wallet_id, limit).await?)
    }
}
