//! # Wallet Balances
//!
//! A [`Wallet`] is one user's coin balance. It is created lazily with a zero
//! balance the first time anyone reads or writes it, and it is never deleted.
//!
//! Balances are `u64` and cannot go negative: [`Wallet::apply_delta`]
//! rejects any debit larger than the current balance and any credit that
//! would overflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// A single user's coin balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// The owner. Also the storage key.
    pub user_id: Uuid,

    /// Current balance in coins. Always equals the sum of the owner's
    /// ledger deltas.
    pub balance: u64,

    /// Timestamp of the last balance-modifying operation (or creation).
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates a new zero-balance wallet for `user_id`.
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: 0,
            updated_at: now,
        }
    }

    /// Applies a signed delta to the balance and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientBalance`] if a debit exceeds the
    /// balance, and [`LedgerError::BalanceOverflow`] if a credit would exceed
    /// `u64::MAX`. The wallet is unchanged on error.
    pub fn apply_delta(&mut self, delta: i64, now: DateTime<Utc>) -> LedgerResult<u64> {
        let magnitude = delta.unsigned_abs();
        let new_balance = if delta >= 0 {
            self.balance
                .checked_add(magnitude)
                .ok_or(LedgerError::BalanceOverflow {
                    current: self.balance,
                    delta,
                })?
        } else {
            self.balance
                .checked_sub(magnitude)
                .ok_or(LedgerError::InsufficientBalance {
                    need: magnitude,
                    available: self.balance,
                })?
        };

        self.balance = new_balance;
        self.updated_at = now;
        Ok(new_balance)
    }

    /// Returns `true` if the wallet can cover a debit of `amount`.
    pub fn covers(&self, amount: u64) -> bool {
        self.balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_with(balance: u64) -> Wallet {
        let mut w = Wallet::new(Uuid::new_v4(), Utc::now());
        w.apply_delta(balance as i64, Utc::now()).unwrap();
        w
    }

    #[test]
    fn new_wallet_is_empty() {
        let w = Wallet::new(Uuid::new_v4(), Utc::now());
        assert_eq!(w.balance, 0);
    }

    #[test]
    fn credit_then_debit() {
        let mut w = wallet_with(50);
        assert_eq!(w.apply_delta(-20, Utc::now()).unwrap(), 30);
        assert_eq!(w.apply_delta(5, Utc::now()).unwrap(), 35);
    }

    #[test]
    fn debit_to_zero_is_allowed() {
        let mut w = wallet_with(15);
        assert_eq!(w.apply_delta(-15, Utc::now()).unwrap(), 0);
    }

    #[test]
    fn overdraw_rejected_and_balance_untouched() {
        let mut w = wallet_with(15);
        let err = w.apply_delta(-20, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                need: 20,
                available: 15
            }
        ));
        assert_eq!(w.balance, 15);
    }

    #[test]
    fn overflow_rejected() {
        let mut w = Wallet::new(Uuid::new_v4(), Utc::now());
        w.balance = u64::MAX - 1;
        let err = w.apply_delta(2, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow { .. }));
        assert_eq!(w.balance, u64::MAX - 1);
    }

    #[test]
    fn covers_is_inclusive() {
        let w = wallet_with(20);
        assert!(w.covers(20));
        assert!(!w.covers(21));
    }
}
