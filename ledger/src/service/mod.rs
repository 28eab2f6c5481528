//! # Ledger Service
//!
//! The procedures callers actually invoke. Each one takes the authenticated
//! [`Principal`], checks its role, and then does all of its reads and writes
//! inside a single [`LedgerDB::transact`] call.
//!
//! ```text
//! quests.rs       — create / submit / approve / reject / activate, reads
//! submissions.rs  — MCQ auto-grading, text answers, staff review
//! wallet.rs       — wallet and ledger reads, coin grants
//! roles.rs        — role-change guard and audit log
//! audit.rs        — ledger-vs-wallet consistency check
//! ```
//!
//! Logging happens after commit. The transaction closure may run more than
//! once under contention, so it must not log or touch anything outside the
//! store.

mod audit;
mod quests;
mod roles;
mod submissions;
mod wallet;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

pub use audit::AuditMismatch;

use crate::error::{LedgerError, LedgerResult};
use crate::profile::Profile;
use crate::quest::{Quest, Submission};
use crate::role::{Principal, Role};
use crate::storage::LedgerDB;
use crate::wallet::{LedgerEntry, Wallet};

/// A committed balance change: the ledger entry and the wallet after it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Posting {
    pub entry: LedgerEntry,
    pub wallet: Wallet,
}

/// Result of `approve_quest`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Approval {
    pub quest: Quest,
    /// The `quest_budget` debit against the approver.
    pub budget: Posting,
}

/// Result of grading or reviewing a submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Graded {
    pub submission: Submission,
    /// The `quest_award` credit, when the answer earned one.
    pub award: Option<Posting>,
}

/// Entry point for every ledger procedure.
///
/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone)]
pub struct LedgerService {
    db: LedgerDB,
}

impl LedgerService {
    pub fn new(db: LedgerDB) -> Self {
        Self { db }
    }

    /// Direct access to the underlying store.
    pub fn db(&self) -> &LedgerDB {
        &self.db
    }

    /// Resolves a verified user id into a principal, creating a `student`
    /// profile the first time the user is seen.
    pub fn principal_for(&self, user_id: Uuid) -> LedgerResult<Principal> {
        if let Some(profile) = self.db.get_profile(user_id)? {
            return Ok(Principal::new(user_id, profile.role));
        }

        let now = Utc::now();
        let profile = self.db.transact(|tx| match tx.profile(user_id)? {
            Some(existing) => Ok(existing),
            None => {
                let profile = Profile::student(user_id, now);
                tx.put_profile(&profile)?;
                Ok(profile)
            }
        })?;
        Ok(Principal::new(user_id, profile.role))
    }

    /// Returns a user's profile.
    pub fn get_profile(&self, user_id: Uuid) -> LedgerResult<Profile> {
        self.db
            .get_profile(user_id)?
            .ok_or(LedgerError::ProfileNotFound(user_id))
    }
}

/// Rejects `caller` unless it holds at least `required`.
fn require(caller: &Principal, required: Role, action: &str) -> LedgerResult<()> {
    if caller.can(required) {
        Ok(())
    } else {
        tracing::warn!(
            user = %caller.user_id,
            role = %caller.role,
            required = %required,
            action,
            "Rejected: insufficient role"
        );
        Err(LedgerError::requires(required, action))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use super::*;
    use crate::quest::{McqOption, NewQuest, QuestConfig};

    pub fn service() -> LedgerService {
        LedgerService::new(LedgerDB::open_temporary().expect("temp db"))
    }

    pub fn principal(role: Role) -> Principal {
        Principal::new(Uuid::new_v4(), role)
    }

    pub fn mcq_quest(reward: u64) -> NewQuest {
        let mut options = BTreeMap::new();
        for (key, text, correct) in [("a", "Rook", false), ("b", "Knight", true), ("c", "Bishop", false)] {
            options.insert(
                key.to_string(),
                McqOption {
                    text: text.to_string(),
                    is_correct: correct,
                },
            );
        }
        NewQuest {
            title: "Piece Movement".into(),
            description: "Know your pieces".into(),
            reward_coins: reward,
            attribute_id: None,
            config: QuestConfig::Mcq {
                question: "Which piece moves in an L?".into(),
                options,
            },
        }
    }

    pub fn text_quest(reward: u64) -> NewQuest {
        NewQuest {
            title: "Opening Plan".into(),
            description: String::new(),
            reward_coins: reward,
            attribute_id: None,
            config: QuestConfig::Text {
                prompt: "Describe your plan against 1.e4".into(),
                rubric: Some("Mentions development".into()),
            },
        }
    }

    /// A master admin holding `balance` coins, granted by themselves.
    pub fn funded_admin(svc: &LedgerService, balance: u64) -> Principal {
        let admin = principal(Role::MasterAdmin);
        if balance > 0 {
            svc.grant_coins(&admin, admin.user_id, balance, None).unwrap();
        }
        admin
    }

    /// Creates, submits, and approves a quest. Returns its id.
    pub fn live_quest(svc: &LedgerService, admin: &Principal, new: NewQuest) -> Uuid {
        let quest = svc.create_quest(admin, new).unwrap();
        svc.submit_quest(admin, quest.id).unwrap();
        svc.approve_quest(admin, quest.id).unwrap();
        quest.id
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn first_seen_user_becomes_student() {
        let svc = service();
        let user = Uuid::new_v4();
        let principal = svc.principal_for(user).unwrap();
        assert_eq!(principal.role, Role::Student);
        assert_eq!(svc.get_profile(user).unwrap().role, Role::Student);

        // Second lookup reads the stored profile.
        assert_eq!(svc.principal_for(user).unwrap(), principal);
    }

    #[test]
    fn missing_profile_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.get_profile(Uuid::new_v4()),
            Err(LedgerError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn require_checks_ordering() {
        let staff = principal(Role::Staff);
        assert!(require(&staff, Role::Student, "read").is_ok());
        assert!(require(&staff, Role::Staff, "create quests").is_ok());
        let err = require(&staff, Role::MasterAdmin, "approve quests").unwrap_err();
        assert_eq!(err.to_string(), "Only master_admin can approve quests");
    }
}
