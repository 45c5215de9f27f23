//! Command Handlers module
//!
//! Handlers that run ledger operations against a [`LedgerStore`], each in
//! its own unit of work.
//!
//! [`LedgerStore`]: crate::store::LedgerStore

mod adjustment;
mod commands;
mod deposit_handler;
mod ledger_writer;
mod locking;
mod retry;
mod transfer_handler;
mod wallet_handler;
mod withdraw_handler;

#[cfg(test)]
mod tests;

pub use commands::*;
pub use deposit_handler::DepositHandler;
pub use ledger_writer::LedgerWriter;
pub use locking::lock_in_canonical_order;
pub use retry::RetryPolicy;
pub use transfer_handler::{TransferHandler, TransferState};
pub use wallet_handler::{WalletHandler, MAX_HISTORY_LIMIT};
pub use withdraw_handler::WithdrawHandler;
