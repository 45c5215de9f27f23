//! Domain module
//!
//! Core ledger types: amounts, currencies, wallets, balance keys and
//! ledger entries.

pub mod amount;
pub mod context;
pub mod currency;
pub mod entry;
pub mod wallet;

pub use amount::{minor_to_major, Amount, AmountError, Balance};
pub use context::OperationContext;
pub use currency::{CurrencyCode, CurrencyError};
pub use entry::{EntryType, LedgerEntry, NewLedgerEntry, UnknownEntryType};
pub use wallet::{BalanceKey, UserId, Wallet, WalletBalance, WalletId, WalletWithBalances};
