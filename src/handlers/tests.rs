//! Handler tests against the in-memory store

use std::sync::Arc;

use crate::converter::RateTable;
use crate::domain::{
    Amount, BalanceKey, CurrencyCode, EntryType, OperationContext, UserId, WalletId,
};
use crate::error::LedgerError;
use crate::handlers::{
    BalanceCommand, DepositHandler, TransferCommand, TransferHandler, TransferStatus,
    WalletHandler, WithdrawHandler,
};
use crate::store::{LedgerStore, MemoryLedgerStore};

fn code(s: &str) -> CurrencyCode {
    CurrencyCode::new(s).unwrap()
}

fn amount(minor_units: i64) -> Amount {
    Amount::new(minor_units).unwrap()
}

struct Fixture {
    store: MemoryLedgerStore,
    transfers: TransferHandler<MemoryLedgerStore>,
    deposits: DepositHandler<MemoryLedgerStore>,
    withdrawals: WithdrawHandler<MemoryLedgerStore>,
    wallets: WalletHandler<MemoryLedgerStore>,
    a: WalletId,
    b: WalletId,
}

async fn fixture() -> Fixture {
    let store = MemoryLedgerStore::new();
    let a = store.create_wallet(UserId(1), "alice").await.unwrap().id;
    let b = store.create_wallet(UserId(2), "bob").await.unwrap().id;
    Fixture {
        transfers: TransferHandler::new(store.clone(), Arc::new(RateTable::reference_rates())),
        deposits: DepositHandler::new(store.clone()),
        withdrawals: WithdrawHandler::new(store.clone()),
        wallets: WalletHandler::new(store.clone()),
        store,
        a,
        b,
    }
}

impl Fixture {
    async fn deposit(&self, wallet: WalletId, currency: &str, minor_units: i64, reference: &str) {
        let command =
            BalanceCommand::new(wallet, code(currency), amount(minor_units), reference).unwrap();
        self.deposits
            .execute(&command, &OperationContext::new())
            .await
            .unwrap();
    }

    fn balance(&self, wallet: WalletId, currency: &str) -> Option<i64> {
        self.store.balance(&BalanceKey::new(wallet, code(currency)))
    }

    fn usd_transfer(&self, minor_units: i64, reference: &str) -> TransferCommand {
        TransferCommand::new(
            self.a,
            self.b,
            code("USD"),
            code("USD"),
            amount(minor_units),
            reference,
        )
        .unwrap()
    }
}

#[tokio::test]
async fn test_deposit_creates_balance() {
    let f = fixture().await;
    let command = BalanceCommand::new(f.a, code("USD"), amount(1000), "dep-1").unwrap();

    let processed = f
        .deposits
        .execute(&command, &OperationContext::new())
        .await
        .unwrap();

    assert!(!processed.replayed);
    assert_eq!(processed.receipt.new_amount, 1000);
    assert_eq!(f.balance(f.a, "USD"), Some(1000));
}

#[tokio::test]
async fn test_deposit_replay_does_not_credit_twice() {
    let f = fixture().await;
    let command = BalanceCommand::new(f.a, code("USD"), amount(1000), "dep-1").unwrap();
    let context = OperationContext::new();

    let first = f.deposits.execute(&command, &context).await.unwrap();
    let second = f.deposits.execute(&command, &context).await.unwrap();

    assert!(second.replayed);
    assert_eq!(second.receipt, first.receipt);
    assert_eq!(f.balance(f.a, "USD"), Some(1000));
    assert_eq!(f.store.entry_count(), 1);
}

#[tokio::test]
async fn test_transfer_moves_funds_and_writes_three_entries() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 1000, "dep-1").await;

    let processed = f
        .transfers
        .execute(&f.usd_transfer(400, "r1"), &OperationContext::new())
        .await
        .unwrap();

    assert_eq!(processed.receipt.status, TransferStatus::Completed);
    assert_eq!(processed.receipt.from_balance, 600);
    assert_eq!(processed.receipt.to_balance, 400);
    assert_eq!(f.balance(f.a, "USD"), Some(600));
    assert_eq!(f.balance(f.b, "USD"), Some(400));

    let history = f.wallets.history(f.a, 10).await.unwrap();
    let types: Vec<EntryType> = history.iter().map(|e| e.entry_type).collect();
    assert_eq!(
        types,
        vec![EntryType::Meta, EntryType::TransferOut, EntryType::Deposit]
    );
    assert_eq!(history[0].reference.as_deref(), Some("r1"));
    assert_eq!(history[1].reference.as_deref(), Some("r1-out"));

    let incoming = f.wallets.history(f.b, 10).await.unwrap();
    assert_eq!(incoming[0].reference.as_deref(), Some("r1-in"));
    assert_eq!(incoming[0].amount, 400);
}

#[tokio::test]
async fn test_transfer_replay_returns_recorded_receipt() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 1000, "dep-1").await;
    let command = f.usd_transfer(400, "r1");

    let first = f
        .transfers
        .execute(&command, &OperationContext::new())
        .await
        .unwrap();
    let entries = f.store.entry_count();

    let replay = f
        .transfers
        .execute(&command, &OperationContext::new())
        .await
        .unwrap();

    assert!(replay.replayed);
    assert_eq!(replay.receipt, first.receipt);
    assert_eq!(f.balance(f.a, "USD"), Some(600));
    assert_eq!(f.store.entry_count(), entries);
}

#[tokio::test]
async fn test_reference_reuse_with_different_request_conflicts() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 1000, "dep-1").await;
    f.transfers
        .execute(&f.usd_transfer(400, "r1"), &OperationContext::new())
        .await
        .unwrap();

    let err = f
        .transfers
        .execute(&f.usd_transfer(300, "r1"), &OperationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::IdempotencyConflict { ref reference } if reference == "r1"));

    // A deposit may not reuse a transfer's reference either
    let command = BalanceCommand::new(f.a, code("USD"), amount(1), "r1").unwrap();
    let err = f
        .deposits
        .execute(&command, &OperationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::IdempotencyConflict { .. }));
    assert_eq!(f.balance(f.a, "USD"), Some(600));
}

#[tokio::test]
async fn test_insufficient_funds_leaves_no_trace() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 600, "dep-1").await;
    let entries = f.store.entry_count();

    let err = f
        .transfers
        .execute(&f.usd_transfer(700, "r2"), &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            required: 700,
            available: 600,
            ..
        }
    ));
    assert_eq!(f.balance(f.a, "USD"), Some(600));
    // The destination row created while locking was rolled back too
    assert_eq!(f.balance(f.b, "USD"), None);
    assert_eq!(f.store.entry_count(), entries);
}

#[tokio::test]
async fn test_cross_currency_transfer_converts() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 1000, "dep-1").await;

    let command = TransferCommand::new(f.a, f.b, code("USD"), code("JPY"), amount(100), "fx-1")
        .unwrap();
    let processed = f
        .transfers
        .execute(&command, &OperationContext::new())
        .await
        .unwrap();

    assert_eq!(processed.receipt.credited(), 14749);
    assert_eq!(f.balance(f.a, "USD"), Some(900));
    assert_eq!(f.balance(f.b, "JPY"), Some(14749));
}

#[tokio::test]
async fn test_truncated_remainder_is_recorded() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 1000, "dep-1").await;

    let command = TransferCommand::new(f.a, f.b, code("USD"), code("EUR"), amount(3), "fx-2")
        .unwrap();
    let processed = f
        .transfers
        .execute(&command, &OperationContext::new())
        .await
        .unwrap();

    let conversion = &processed.receipt.conversion;
    assert_eq!(conversion.converted, 2);
    assert_eq!(conversion.remainder.to_string(), "0.7");
}

#[tokio::test]
async fn test_unsupported_conversion_rolls_back_debit() {
    let store = MemoryLedgerStore::new();
    let a = store.create_wallet(UserId(1), "a").await.unwrap().id;
    let b = store.create_wallet(UserId(2), "b").await.unwrap().id;
    let deposits = DepositHandler::new(store.clone());
    let transfers = TransferHandler::new(store.clone(), Arc::new(RateTable::new()));

    let deposit = BalanceCommand::new(a, code("USD"), amount(500), "dep-1").unwrap();
    deposits.execute(&deposit, &OperationContext::new()).await.unwrap();

    let command = TransferCommand::new(a, b, code("USD"), code("GBP"), amount(100), "fx-3")
        .unwrap();
    let err = transfers
        .execute(&command, &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::UnsupportedConversion { .. }));
    assert_eq!(store.balance(&BalanceKey::new(a, code("USD"))), Some(500));
}

#[tokio::test]
async fn test_conversion_truncating_to_zero_is_rejected() {
    let f = fixture().await;
    f.deposit(f.a, "IDR", 10, "dep-1").await;

    let command = TransferCommand::new(f.a, f.b, code("IDR"), code("USD"), amount(10), "fx-4")
        .unwrap();
    let err = f
        .transfers
        .execute(&command, &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InvalidAmount(_)));
    assert_eq!(f.balance(f.a, "IDR"), Some(10));
}

#[tokio::test]
async fn test_transfer_to_unknown_wallet() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 1000, "dep-1").await;

    let command = TransferCommand::new(
        f.a,
        WalletId(99),
        code("USD"),
        code("USD"),
        amount(100),
        "r9",
    )
    .unwrap();
    let err = f
        .transfers
        .execute(&command, &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::WalletNotFound(WalletId(99))));
    assert_eq!(f.balance(f.a, "USD"), Some(1000));
}

#[tokio::test]
async fn test_withdraw() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 1000, "dep-1").await;

    let command = BalanceCommand::new(f.a, code("USD"), amount(250), "wd-1").unwrap();
    let processed = f
        .withdrawals
        .execute(&command, &OperationContext::new())
        .await
        .unwrap();
    assert_eq!(processed.receipt.new_amount, 750);

    let command = BalanceCommand::new(f.a, code("USD"), amount(751), "wd-2").unwrap();
    let err = f
        .withdrawals
        .execute(&command, &OperationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(f.balance(f.a, "USD"), Some(750));
}

#[tokio::test]
async fn test_withdraw_replay_with_deposit_reference_conflicts() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 1000, "op-1").await;

    let command = BalanceCommand::new(f.a, code("USD"), amount(1000), "op-1").unwrap();
    let err = f
        .withdrawals
        .execute(&command, &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::IdempotencyConflict { .. }));
    assert_eq!(f.balance(f.a, "USD"), Some(1000));
}

#[tokio::test]
async fn test_wallet_queries() {
    let f = fixture().await;
    f.deposit(f.a, "USD", 1000, "dep-1").await;
    f.deposit(f.a, "JPY", 500, "dep-2").await;

    let wallet = f.wallets.get(f.a).await.unwrap();
    assert_eq!(wallet.wallet.name, "alice");
    let currencies: Vec<&str> = wallet.balances.iter().map(|b| b.currency.as_str()).collect();
    assert_eq!(currencies, vec!["JPY", "USD"]);

    assert!(matches!(
        f.wallets.get(WalletId(404)).await,
        Err(LedgerError::WalletNotFound(_))
    ));
    assert!(matches!(
        f.wallets.history(WalletId(404), 10).await,
        Err(LedgerError::WalletNotFound(_))
    ));

    let created = f.wallets.create(UserId(3), "  ").await.unwrap();
    assert_eq!(created.name, "Main");
}

#[tokio::test]
async fn test_context_is_recorded_with_outcome() {
    let f = fixture().await;
    let context = OperationContext::new().with_request_user(1);
    let command = BalanceCommand::new(f.a, code("USD"), amount(100), "dep-ctx").unwrap();
    f.deposits.execute(&command, &context).await.unwrap();

    let history = f.wallets.history(f.a, 1).await.unwrap();
    let meta = history[0].meta.clone().unwrap();
    assert_eq!(meta["kind"], "deposit");
    assert_eq!(meta["context"]["request_user_id"], 1);
    assert_eq!(meta["outcome"]["new_amount"], 100);
}
