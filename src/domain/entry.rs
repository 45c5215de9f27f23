//! Ledger entries
//!
//! Immutable records of every balance-affecting event. Amounts are stored
//! unsigned; the direction comes from the entry type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{CurrencyCode, WalletId};

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deposit,
    Withdraw,
    TransferOut,
    TransferIn,
    Payment,
    /// Carries an operation's idempotency record; moves no value.
    Meta,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::Withdraw => "withdraw",
            EntryType::TransferOut => "transfer_out",
            EntryType::TransferIn => "transfer_in",
            EntryType::Payment => "payment",
            EntryType::Meta => "meta",
        }
    }

    /// Effect of an entry of this type on its balance.
    pub fn signed_amount(&self, amount: i64) -> i64 {
        match self {
            EntryType::Deposit | EntryType::TransferIn => amount,
            EntryType::Withdraw | EntryType::TransferOut | EntryType::Payment => -amount,
            EntryType::Meta => 0,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown ledger entry type: {0}")]
pub struct UnknownEntryType(pub String);

impl FromStr for EntryType {
    type Err = UnknownEntryType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EntryType::Deposit),
            "withdraw" => Ok(EntryType::Withdraw),
            "transfer_out" => Ok(EntryType::TransferOut),
            "transfer_in" => Ok(EntryType::TransferIn),
            "payment" => Ok(EntryType::Payment),
            "meta" => Ok(EntryType::Meta),
            other => Err(UnknownEntryType(other.to_string())),
        }
    }
}

/// Persisted ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub wallet_id: WalletId,
    pub entry_type: EntryType,
    pub currency: CurrencyCode,
    pub amount: i64,
    pub reference: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn signed_amount(&self) -> i64 {
        self.entry_type.signed_amount(self.amount)
    }
}

/// Ledger entry about to be appended inside a unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub wallet_id: WalletId,
    pub entry_type: EntryType,
    pub currency: CurrencyCode,
    pub amount: i64,
    pub reference: Option<String>,
    pub meta: Option<serde_json::Value>,
}

impl NewLedgerEntry {
    pub fn new(
        wallet_id: WalletId,
        entry_type: EntryType,
        currency: CurrencyCode,
        amount: i64,
    ) -> Self {
        Self {
            wallet_id,
            entry_type,
            currency,
            amount,
            reference: None,
            meta: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}
