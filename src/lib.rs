//! wallet_ledger Library
//!
//! Multi-currency wallet ledger: balances, transfers with conversion,
//! deposits and withdrawals, each applied exactly once per reference and
//! recorded as immutable ledger entries.

pub mod audit;
pub mod config;
pub mod converter;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod idempotency;
pub mod ledger;
pub mod store;
pub mod telemetry;

mod error;

pub use config::Config;
pub use converter::RateTable;
pub use domain::{Amount, AmountError, Balance, CurrencyCode, OperationContext, WalletId};
pub use error::{ErrorResponse, LedgerError, LedgerResult};
pub use ledger::WalletLedger;
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
