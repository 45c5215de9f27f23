//! Wallets and balance keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::CurrencyCode;

/// Numeric wallet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub i64);

impl WalletId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning user of a wallet. Users themselves live outside the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// A user-owned container of currency balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Current amount of one currency held by one wallet, in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub wallet_id: WalletId,
    pub currency: CurrencyCode,
    pub amount: i64,
}

impl WalletBalance {
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.wallet_id, self.currency.clone())
    }
}

/// Wallet together with every balance it has touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletWithBalances {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub balances: Vec<WalletBalance>,
}

/// Identity of a balance row: `(wallet, currency)`.
///
/// The `Ord` impl is the canonical lock order shared by every
/// multi-balance operation: wallet id ascending, then currency code
/// ascending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub wallet_id: WalletId,
    pub currency: CurrencyCode,
}

impl BalanceKey {
    pub fn new(wallet_id: WalletId, currency: CurrencyCode) -> Self {
        Self {
            wallet_id,
            currency,
        }
    }
}

impl Ord for BalanceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wallet_id
            .cmp(&other.wallet_id)
            .then_with(|| self.currency.cmp(&other.currency))
    }
}

impl PartialOrd for BalanceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.wallet_id, self.currency)
    }
}
