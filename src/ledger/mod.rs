// ============================================================================
// Balance Ledger
// Per-user per-asset funds with lock accounting and atomic settlement
// ============================================================================

use crate::domain::pair::{Asset, UserId};
use crate::error::{ExchangeError, ExchangeResult};
use crate::numeric::Amount;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::sync::Arc;
use tracing::debug;

type LedgerKey = (UserId, Asset);
type RowGuard = ArcMutexGuard<RawMutex, BalanceRow>;

// ============================================================================
// Balance Row
// ============================================================================

/// Funds of one user in one asset.
///
/// Invariant after every mutation: `total >= locked >= 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceRow {
    total: Amount,
    locked: Amount,
}

/// Outcome of a row mutation that needs funds it cannot take.
#[derive(Debug, Clone, Copy)]
struct Shortfall {
    required: Amount,
    available: Amount,
}

impl BalanceRow {
    fn available(&self) -> Amount {
        self.total - self.locked
    }

    fn credit(&mut self, amount: Amount) -> Result<(), ExchangeError> {
        self.total = self.total.checked_add(amount)?;
        Ok(())
    }

    /// Spend from the unlocked portion; locked funds are never debitable.
    fn debit(&mut self, amount: Amount) -> Result<(), Shortfall> {
        if self.available() < amount {
            return Err(Shortfall {
                required: amount,
                available: self.available(),
            });
        }
        self.total = self.total - amount;
        Ok(())
    }

    fn lock(&mut self, amount: Amount) -> Result<(), Shortfall> {
        if self.available() < amount {
            return Err(Shortfall {
                required: amount,
                available: self.available(),
            });
        }
        self.locked = self.locked + amount;
        Ok(())
    }

    fn unlock(&mut self, amount: Amount) -> Result<(), Shortfall> {
        if self.locked < amount {
            return Err(Shortfall {
                required: amount,
                available: self.locked,
            });
        }
        self.locked = self.locked - amount;
        Ok(())
    }

    /// Consume locked funds: `locked -= amount; total -= amount`.
    fn settle_locked(&mut self, amount: Amount) -> Result<(), Shortfall> {
        if self.locked < amount || self.total < amount {
            return Err(Shortfall {
                required: amount,
                available: self.locked.min(self.total),
            });
        }
        self.locked = self.locked - amount;
        self.total = self.total - amount;
        Ok(())
    }
}

/// Read-only view of a balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BalanceSnapshot {
    pub total: Amount,
    pub locked: Amount,
    pub available: Amount,
}

// ============================================================================
// Ledger
// ============================================================================

/// Shared balance ledger.
///
/// Rows are created lazily and never destroyed. Every row sits behind its
/// own mutex, so fills on different pairs may touch the same user's
/// balances concurrently while each operation still sees a consistent
/// `(total, locked)`. Multi-row settlement goes through [`Ledger::begin`],
/// which locks all participating rows in sorted key order and restores
/// their prior state unless committed.
#[derive(Default)]
pub struct Ledger {
    rows: DashMap<LedgerKey, Arc<Mutex<BalanceRow>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, user: UserId, asset: &Asset) -> Arc<Mutex<BalanceRow>> {
        self.rows
            .entry((user, asset.clone()))
            .or_default()
            .clone()
    }

    fn insufficient(asset: &Asset, shortfall: Shortfall) -> ExchangeError {
        ExchangeError::InsufficientBalance {
            asset: asset.clone(),
            required: shortfall.required,
            available: shortfall.available,
        }
    }

    fn check_amount(amount: Amount) -> ExchangeResult<()> {
        if amount.is_negative() {
            return Err(ExchangeError::Internal(
                "negative amount passed to ledger operation".to_string(),
            ));
        }
        Ok(())
    }

    /// Add funds to a row (deposits, trade proceeds).
    pub fn credit(&self, user: UserId, asset: &Asset, amount: Amount) -> ExchangeResult<()> {
        Self::check_amount(amount)?;
        self.row(user, asset).lock().credit(amount)?;
        debug!(%user, %asset, %amount, "ledger credit");
        Ok(())
    }

    /// Remove available funds from a row (withdrawals).
    pub fn debit(&self, user: UserId, asset: &Asset, amount: Amount) -> ExchangeResult<()> {
        Self::check_amount(amount)?;
        self.row(user, asset)
            .lock()
            .debit(amount)
            .map_err(|s| Self::insufficient(asset, s))?;
        debug!(%user, %asset, %amount, "ledger debit");
        Ok(())
    }

    /// Reserve available funds for an order.
    pub fn lock(&self, user: UserId, asset: &Asset, amount: Amount) -> ExchangeResult<()> {
        Self::check_amount(amount)?;
        self.row(user, asset)
            .lock()
            .lock(amount)
            .map_err(|s| Self::insufficient(asset, s))?;
        debug!(%user, %asset, %amount, "ledger lock");
        Ok(())
    }

    /// Release a reservation.
    pub fn unlock(&self, user: UserId, asset: &Asset, amount: Amount) -> ExchangeResult<()> {
        Self::check_amount(amount)?;
        self.row(user, asset)
            .lock()
            .unlock(amount)
            .map_err(|s| Self::insufficient(asset, s))?;
        debug!(%user, %asset, %amount, "ledger unlock");
        Ok(())
    }

    /// Consume a reservation during a fill.
    pub fn settle_locked(
        &self,
        user: UserId,
        asset: &Asset,
        amount: Amount,
    ) -> ExchangeResult<()> {
        Self::check_amount(amount)?;
        self.row(user, asset)
            .lock()
            .settle_locked(amount)
            .map_err(|s| Self::insufficient(asset, s))?;
        Ok(())
    }

    pub fn balance(&self, user: UserId, asset: &Asset) -> BalanceSnapshot {
        let row = self.row(user, asset);
        let row = row.lock();
        BalanceSnapshot {
            total: row.total,
            locked: row.locked,
            available: row.available(),
        }
    }

    /// Sum of `total` across every user for one asset. Constant except
    /// for deposits and withdrawals; used by conservation checks.
    pub fn asset_supply(&self, asset: &Asset) -> Amount {
        self.rows
            .iter()
            .filter(|entry| &entry.key().1 == asset)
            .fold(Amount::ZERO, |acc, entry| acc + entry.value().lock().total)
    }

    /// Open a multi-row transaction over `participants`.
    ///
    /// Rows are locked in sorted key order (settlement is the only
    /// multi-row caller, so the ordering rules out deadlock) and stay
    /// locked until the transaction commits or rolls back on drop.
    pub fn begin(&self, participants: &[(UserId, &Asset)]) -> LedgerTxn {
        let mut keys: Vec<LedgerKey> = participants
            .iter()
            .map(|(user, asset)| (*user, (*asset).clone()))
            .collect();
        keys.sort();
        keys.dedup();

        let entries = keys
            .into_iter()
            .map(|key| {
                let arc = self.row(key.0, &key.1);
                let guard = Mutex::lock_arc(&arc);
                let saved = *guard;
                TxnEntry { key, guard, saved }
            })
            .collect();

        LedgerTxn {
            entries,
            committed: false,
        }
    }
}

// ============================================================================
// Multi-row Transaction
// ============================================================================

struct TxnEntry {
    key: LedgerKey,
    guard: RowGuard,
    saved: BalanceRow,
}

/// A group of ledger mutations that commits or rolls back as one unit.
///
/// Dropping an uncommitted transaction restores every participating row
/// to its state at `begin` time.
pub struct LedgerTxn {
    entries: Vec<TxnEntry>,
    committed: bool,
}

impl LedgerTxn {
    fn entry_mut(&mut self, user: UserId, asset: &Asset) -> ExchangeResult<&mut BalanceRow> {
        self.entries
            .iter_mut()
            .find(|e| e.key.0 == user && &e.key.1 == asset)
            .map(|e| &mut *e.guard)
            .ok_or_else(|| {
                ExchangeError::Internal(format!(
                    "row ({user}, {asset}) not enrolled in ledger transaction"
                ))
            })
    }

    pub fn credit(&mut self, user: UserId, asset: &Asset, amount: Amount) -> ExchangeResult<()> {
        Ledger::check_amount(amount)?;
        self.entry_mut(user, asset)?.credit(amount)
    }

    pub fn debit(&mut self, user: UserId, asset: &Asset, amount: Amount) -> ExchangeResult<()> {
        Ledger::check_amount(amount)?;
        self.entry_mut(user, asset)?
            .debit(amount)
            .map_err(|s| Ledger::insufficient(asset, s))
    }

    pub fn unlock(&mut self, user: UserId, asset: &Asset, amount: Amount) -> ExchangeResult<()> {
        Ledger::check_amount(amount)?;
        self.entry_mut(user, asset)?
            .unlock(amount)
            .map_err(|s| Ledger::insufficient(asset, s))
    }

    pub fn settle_locked(
        &mut self,
        user: UserId,
        asset: &Asset,
        amount: Amount,
    ) -> ExchangeResult<()> {
        Ledger::check_amount(amount)?;
        self.entry_mut(user, asset)?
            .settle_locked(amount)
            .map_err(|s| Ledger::insufficient(asset, s))
    }

    /// Keep all mutations and release the row locks.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for LedgerTxn {
    fn drop(&mut self) {
        if !self.committed {
            for entry in &mut self.entries {
                *entry.guard = entry.saved;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Credit(u32),
        Debit(u32),
        Lock(u32),
        Unlock(u32),
        Settle(u32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..10_000).prop_map(Op::Credit),
            (0u32..10_000).prop_map(Op::Debit),
            (0u32..10_000).prop_map(Op::Lock),
            (0u32..10_000).prop_map(Op::Unlock),
            (0u32..10_000).prop_map(Op::Settle),
        ]
    }

    proptest! {
        // total >= locked >= 0 after any sequence of row operations,
        // successful or not.
        #[test]
        fn row_invariant_holds(ops in proptest::collection::vec(op_strategy(), 1..64)) {
            let ledger = Ledger::new();
            let user = UserId(9);
            let asset = Asset::new("BTC");

            for op in ops {
                let _ = match op {
                    Op::Credit(v) => ledger.credit(user, &asset, Amount::from_integer(v as i64).unwrap()),
                    Op::Debit(v) => ledger.debit(user, &asset, Amount::from_integer(v as i64).unwrap()),
                    Op::Lock(v) => ledger.lock(user, &asset, Amount::from_integer(v as i64).unwrap()),
                    Op::Unlock(v) => ledger.unlock(user, &asset, Amount::from_integer(v as i64).unwrap()),
                    Op::Settle(v) => ledger.settle_locked(user, &asset, Amount::from_integer(v as i64).unwrap()),
                };
                let b = ledger.balance(user, &asset);
                prop_assert!(!b.locked.is_negative());
                prop_assert!(b.total >= b.locked);
            }
        }
    }
}
