//! Reconciliation audit
//!
//! Recomputes every balance from the signed sum of its ledger entries and
//! reports where the two disagree. A consistent ledger has no
//! discrepancies and no negative balances.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{BalanceKey, WalletBalance};
use crate::error::LedgerResult;
use crate::store::LedgerStore;

/// Balance whose stored amount differs from its ledger total
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub key: BalanceKey,
    /// Stored amount, 0 when the row is missing
    pub balance: i64,
    pub ledger_total: i64,
}

impl Discrepancy {
    pub fn difference(&self) -> i64 {
        self.balance - self.ledger_total
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub balances_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub negative_balances: Vec<WalletBalance>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty() && self.negative_balances.is_empty()
    }

    /// Compare stored balances with per-key ledger totals
    pub fn build(balances: Vec<WalletBalance>, ledger_totals: Vec<(BalanceKey, i64)>) -> Self {
        let mut totals: BTreeMap<BalanceKey, i64> = ledger_totals.into_iter().collect();
        let mut report = ReconciliationReport {
            balances_checked: balances.len(),
            ..Self::default()
        };

        for balance in balances {
            let ledger_total = totals.remove(&balance.key()).unwrap_or(0);
            if balance.amount != ledger_total {
                report.discrepancies.push(Discrepancy {
                    key: balance.key(),
                    balance: balance.amount,
                    ledger_total,
                });
            }
            if balance.amount < 0 {
                report.negative_balances.push(balance);
            }
        }

        // Entries for keys with no balance row
        for (key, ledger_total) in totals {
            if ledger_total != 0 {
                report.discrepancies.push(Discrepancy {
                    key,
                    balance: 0,
                    ledger_total,
                });
            }
        }

        report.discrepancies.sort_by(|a, b| a.key.cmp(&b.key));
        report
    }
}

/// Run a reconciliation over committed state
pub async fn reconcile<S: LedgerStore>(store: &S) -> LedgerResult<ReconciliationReport> {
    let balances = store.all_balances().await?;
    let totals = store.ledger_totals().await?;
    let report = ReconciliationReport::build(balances, totals);

    if report.is_consistent() {
        tracing::info!(
            balances_checked = report.balances_checked,
            "Ledger reconciliation passed"
        );
    } else {
        tracing::error!(
            balances_checked = report.balances_checked,
            discrepancies = report.discrepancies.len(),
            negative_balances = report.negative_balances.len(),
            "Ledger reconciliation found inconsistencies"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CurrencyCode, WalletId};

    fn balance(wallet: i64, currency: &str, amount: i64) -> WalletBalance {
        WalletBalance {
            wallet_id: WalletId(wallet),
            currency: CurrencyCode::new(currency).unwrap(),
            amount,
        }
    }

    #[test]
    fn test_consistent_ledger() {
        let balances = vec![balance(1, "USD", 600), balance(2, "USD", 400)];
        let totals = vec![
            (balances[0].key(), 600),
            (balances[1].key(), 400),
        ];
        let report = ReconciliationReport::build(balances, totals);
        assert!(report.is_consistent());
        assert_eq!(report.balances_checked, 2);
    }

    #[test]
    fn test_reports_drift_and_orphans() {
        let balances = vec![balance(1, "USD", 650), balance(3, "EUR", 0)];
        let totals = vec![
            (balances[0].key(), 600),
            (balance(2, "JPY", 0).key(), 14749),
        ];
        let report = ReconciliationReport::build(balances, totals);

        assert!(!report.is_consistent());
        assert_eq!(report.discrepancies.len(), 2);
        assert_eq!(report.discrepancies[0].difference(), 50);
        assert_eq!(report.discrepancies[1].balance, 0);
        assert_eq!(report.discrepancies[1].ledger_total, 14749);
    }

    #[test]
    fn test_reports_negative_balances() {
        let negative = balance(1, "USD", -5);
        let totals = vec![(negative.key(), -5)];
        let report = ReconciliationReport::build(vec![negative.clone()], totals);
        assert!(report.discrepancies.is_empty());
        assert_eq!(report.negative_balances, vec![negative]);
    }
}
