//! Wallet reads and coin grants.
//!
//! "My" procedures always act on `caller.user_id`. There is no variant that
//! takes a user id, so one student can never read another's ledger.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{require, LedgerService, Posting};
use crate::config::{clamp_page_limit, MAX_COIN_AMOUNT};
use crate::error::{LedgerError, LedgerResult};
use crate::role::{Principal, Role};
use crate::wallet::{LedgerEntry, LedgerKind, Wallet};

impl LedgerService {
    /// Returns the caller's wallet, creating a zero-balance one on first
    /// access.
    pub fn get_my_wallet(&self, caller: &Principal) -> LedgerResult<Wallet> {
        if let Some(wallet) = self.db.get_wallet(caller.user_id)? {
            return Ok(wallet);
        }
        let now = Utc::now();
        self.db
            .transact(|tx| tx.wallet_or_create(caller.user_id, now))
    }

    /// One page of the caller's ledger, newest first.
    ///
    /// `limit` defaults to 50 and is clamped to `[1, 200]`.
    pub fn get_my_ledger(
        &self,
        caller: &Principal,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let limit = clamp_page_limit(limit);
        self.db
            .ledger_page(caller.user_id, limit, offset.unwrap_or(0))
    }

    /// Credits `amount` coins to `recipient` as an `admin_grant`. This is how
    /// coins enter the system, including into admin budgets.
    pub fn grant_coins(
        &self,
        caller: &Principal,
        recipient: Uuid,
        amount: u64,
        note: Option<String>,
    ) -> LedgerResult<Posting> {
        require(caller, Role::MasterAdmin, "grant coins")?;
        if amount == 0 {
            return Err(LedgerError::Validation("amount must be positive".into()));
        }
        if amount > MAX_COIN_AMOUNT {
            return Err(LedgerError::Validation(format!(
                "amount exceeds {MAX_COIN_AMOUNT}"
            )));
        }
        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        let now = Utc::now();
        let posting = self.db.transact(|tx| {
            let (entry, wallet) = tx.post(
                recipient,
                amount as i64,
                LedgerKind::AdminGrant,
                None,
                caller.user_id,
                note.clone(),
                now,
            )?;
            Ok(Posting { entry, wallet })
        })?;

        info!(
            recipient = %recipient,
            admin = %caller.user_id,
            amount,
            balance = posting.wallet.balance,
            "Coins granted"
        );
        Ok(posting)
    }
}
