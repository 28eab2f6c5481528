//! Ledger consistency audit.
//!
//! Recomputes every balance from the ledger and reports the users whose
//! stored wallet disagrees. A healthy store returns an empty list.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{require, LedgerService};
use crate::error::LedgerResult;
use crate::role::{Principal, Role};

/// One user whose wallet does not match their ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditMismatch {
    pub user_id: Uuid,
    /// Stored balance, 0 if the user has entries but no wallet.
    pub balance: u64,
    /// Sum of the user's ledger deltas.
    pub ledger_sum: i128,
}

impl LedgerService {
    /// Runs the audit on behalf of a master admin.
    pub fn audit_ledger(&self, caller: &Principal) -> LedgerResult<Vec<AuditMismatch>> {
        require(caller, Role::MasterAdmin, "audit the ledger")?;
        self.audit()
    }

    /// Runs the audit without an authorization check. For operator tooling
    /// with direct access to the store.
    pub fn audit(&self) -> LedgerResult<Vec<AuditMismatch>> {
        let mut totals: BTreeMap<Uuid, (u64, i128)> = BTreeMap::new();

        for wallet in self.db.all_wallets()? {
            totals.entry(wallet.user_id).or_default().0 = wallet.balance;
        }
        for entry in self.db.all_entries()? {
            totals.entry(entry.user_id).or_default().1 += i128::from(entry.delta);
        }

        let mismatches: Vec<AuditMismatch> = totals
            .into_iter()
            .filter(|(_, (balance, sum))| i128::from(*balance) != *sum)
            .map(|(user_id, (balance, ledger_sum))| AuditMismatch {
                user_id,
                balance,
                ledger_sum,
            })
            .collect();

        if mismatches.is_empty() {
            info!(wallets = self.db.wallet_count(), entries = self.db.entry_count(), "Ledger audit clean");
        } else {
            warn!(mismatches = mismatches.len(), "Ledger audit found mismatches");
        }
        Ok(mismatches)
    }
}
