//! Canonical-order balance locking
//!
//! Every mutation locks its balances through [`lock_in_canonical_order`].
//! Keys are always taken in [`BalanceKey`] order, so two units of work can
//! never wait on each other in a cycle.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::BalanceKey;
use crate::store::{StoreError, UnitOfWork};

/// Lock every key (lowest first), creating missing balances at zero.
/// Returns the locked amount of each key.
pub async fn lock_in_canonical_order<U: UnitOfWork>(
    uow: &mut U,
    keys: &[BalanceKey],
) -> Result<BTreeMap<BalanceKey, i64>, StoreError> {
    let ordered: BTreeSet<&BalanceKey> = keys.iter().collect();
    let mut locked = BTreeMap::new();

    for key in ordered {
        let amount = match uow.lock_balance(key).await? {
            Some(amount) => amount,
            None => {
                if uow.create_if_absent(key, 0).await? {
                    tracing::debug!(balance = %key, "Created balance");
                }
                uow.lock_balance(key)
                    .await?
                    .ok_or_else(|| StoreError::MissingBalance(key.clone()))?
            }
        };
        tracing::trace!(balance = %key, amount, "Locked balance");
        locked.insert(key.clone(), amount);
    }

    Ok(locked)
}
