//! PostgreSQL store
//!
//! Row locks are plain `SELECT ... FOR UPDATE` inside one database
//! transaction; the lock wait is bounded per transaction with
//! `lock_timeout`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

use crate::domain::{
    BalanceKey, CurrencyCode, EntryType, LedgerEntry, NewLedgerEntry, UserId, Wallet,
    WalletBalance, WalletId,
};

use super::{LedgerStore, StoreError, UnitOfWork};

/// Default bound on how long a unit of work waits for a row lock
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type EntryRow = (
    i64,
    i64,
    String,
    String,
    i64,
    Option<String>,
    Option<serde_json::Value>,
    DateTime<Utc>,
);

type WalletRow = (i64, i64, String, DateTime<Utc>);

/// Ledger store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Unit of work wrapping one Postgres transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_balance(&mut self, key: &BalanceKey) -> Result<Option<i64>, StoreError> {
        let amount: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT amount
            FROM wallet_balances
            WHERE wallet_id = $1 AND currency = $2
            FOR UPDATE
            "#,
        )
        .bind(key.wallet_id.get())
        .bind(key.currency.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(amount)
    }

    async fn create_if_absent(
        &mut self,
        key: &BalanceKey,
        initial_amount: i64,
    ) -> Result<bool, StoreError> {
        // ON CONFLICT waits for a concurrent inserter and then does nothing
        let rows = sqlx::query(
            r#"
            INSERT INTO wallet_balances (wallet_id, currency, amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (wallet_id, currency) DO NOTHING
            "#,
        )
        .bind(key.wallet_id.get())
        .bind(key.currency.as_str())
        .bind(initial_amount)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::for_wallet(e, key.wallet_id))?
        .rows_affected();

        Ok(rows == 1)
    }

    async fn apply_delta(&mut self, key: &BalanceKey, delta: i64) -> Result<i64, StoreError> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE wallet_balances
            SET amount = amount + $3
            WHERE wallet_id = $1 AND currency = $2 AND amount + $3 >= 0
            RETURNING amount
            "#,
        )
        .bind(key.wallet_id.get())
        .bind(key.currency.as_str())
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(amount) = updated {
            return Ok(amount);
        }

        // Nothing updated: either the guard rejected it or the row is missing
        let available: Option<i64> = sqlx::query_scalar(
            "SELECT amount FROM wallet_balances WHERE wallet_id = $1 AND currency = $2",
        )
        .bind(key.wallet_id.get())
        .bind(key.currency.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        match available {
            Some(available) => Err(StoreError::InsufficientFunds {
                key: key.clone(),
                required: -delta,
                available,
            }),
            None => Err(StoreError::MissingBalance(key.clone())),
        }
    }

    async fn find_by_reference(
        &mut self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, wallet_id, type, currency, amount, ref_id, meta, created_at
            FROM transactions
            WHERE ref_id = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(entry_from_row).transpose()
    }

    async fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO transactions (wallet_id, type, currency, amount, ref_id, meta)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, created_at
            "#,
        )
        .bind(entry.wallet_id.get())
        .bind(entry.entry_type.as_str())
        .bind(entry.currency.as_str())
        .bind(entry.amount)
        .bind(entry.reference.as_deref())
        .bind(entry.meta.clone())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match StoreError::for_wallet(e, entry.wallet_id) {
            StoreError::DuplicateReference(_) => {
                StoreError::DuplicateReference(entry.reference.clone().unwrap_or_default())
            }
            other => other,
        })?;

        Ok(LedgerEntry {
            id,
            wallet_id: entry.wallet_id,
            entry_type: entry.entry_type,
            currency: entry.currency,
            amount: entry.amount,
            reference: entry.reference,
            meta: entry.meta,
            created_at,
        })
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type UnitOfWork = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Scoped to this transaction only (is_local = true)
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(PgUnitOfWork { tx })
    }

    async fn create_wallet(&self, user_id: UserId, name: &str) -> Result<Wallet, StoreError> {
        let row: WalletRow = sqlx::query_as(
            r#"
            INSERT INTO wallets (user_id, name)
            VALUES ($1, $2)
            RETURNING id, user_id, name, created_at
            "#,
        )
        .bind(user_id.0)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(wallet_from_row(row))
    }

    async fn find_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> = sqlx::query_as(
            "SELECT id, user_id, name, created_at FROM wallets WHERE id = $1",
        )
        .bind(wallet_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(wallet_from_row))
    }

    async fn balances(&self, wallet_id: WalletId) -> Result<Vec<WalletBalance>, StoreError> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            r#"
            SELECT wallet_id, currency, amount
            FROM wallet_balances
            WHERE wallet_id = $1
            ORDER BY currency
            "#,
        )
        .bind(wallet_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(balance_from_row).collect()
    }

    async fn all_balances(&self) -> Result<Vec<WalletBalance>, StoreError> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT wallet_id, currency, amount FROM wallet_balances ORDER BY wallet_id, currency",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(balance_from_row).collect()
    }

    async fn entries(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, wallet_id, type, currency, amount, ref_id, meta, created_at
            FROM transactions
            WHERE wallet_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(wallet_id.get())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn ledger_totals(&self) -> Result<Vec<(BalanceKey, i64)>, StoreError> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            r#"
            SELECT wallet_id, currency, COALESCE(SUM(
                CASE type
                    WHEN 'deposit' THEN amount
                    WHEN 'transfer_in' THEN amount
                    WHEN 'withdraw' THEN -amount
                    WHEN 'transfer_out' THEN -amount
                    WHEN 'payment' THEN -amount
                    ELSE 0
                END
            ), 0)::BIGINT AS total
            FROM transactions
            GROUP BY wallet_id, currency
            ORDER BY wallet_id, currency
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(wallet_id, currency, total)| {
                let currency = parse_currency(&currency)?;
                Ok((BalanceKey::new(WalletId(wallet_id), currency), total))
            })
            .collect()
    }
}

fn parse_currency(raw: &str) -> Result<CurrencyCode, StoreError> {
    CurrencyCode::new(raw).map_err(|e| StoreError::CorruptRow(e.to_string()))
}

fn wallet_from_row((id, user_id, name, created_at): WalletRow) -> Wallet {
    Wallet {
        id: WalletId(id),
        user_id: UserId(user_id),
        name,
        created_at,
    }
}

fn balance_from_row(
    (wallet_id, currency, amount): (i64, String, i64),
) -> Result<WalletBalance, StoreError> {
    Ok(WalletBalance {
        wallet_id: WalletId(wallet_id),
        currency: parse_currency(&currency)?,
        amount,
    })
}

fn entry_from_row(
    (id, wallet_id, entry_type, currency, amount, reference, meta, created_at): EntryRow,
) -> Result<LedgerEntry, StoreError> {
    let entry_type: EntryType = entry_type
        .parse()
        .map_err(|e: crate::domain::UnknownEntryType| StoreError::CorruptRow(e.to_string()))?;

    Ok(LedgerEntry {
        id,
        wallet_id: WalletId(wallet_id),
        entry_type,
        currency: parse_currency(&currency)?,
        amount,
        reference,
        meta,
        created_at,
    })
}
