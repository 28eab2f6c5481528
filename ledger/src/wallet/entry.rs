//! Ledger entries: the append-only record of every coin movement.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Reward paid to a student for a correct or accepted submission.
    QuestAward,
    /// Reward budget debited from the approving admin.
    QuestBudget,
    /// Coins granted by a master admin.
    AdminGrant,
}

impl LedgerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerKind::QuestAward => "quest_award",
            LedgerKind::QuestBudget => "quest_budget",
            LedgerKind::AdminGrant => "admin_grant",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable coin movement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Store-wide sequence number. Strictly increasing in write order.
    pub id: u64,
    /// Whose wallet this entry moved.
    pub user_id: Uuid,
    /// Signed coin amount. Negative for debits.
    pub delta: i64,
    pub kind: LedgerKind,
    /// The quest that caused the movement, if any.
    pub quest_id: Option<Uuid>,
    /// The principal whose call wrote the entry.
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    /// Free-form note (grants only).
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&LedgerKind::QuestBudget).unwrap(),
            "\"quest_budget\""
        );
        assert_eq!(LedgerKind::QuestAward.to_string(), "quest_award");
    }

    #[test]
    fn entry_survives_bincode() {
        let entry = LedgerEntry {
            id: 7,
            user_id: Uuid::new_v4(),
            delta: -20,
            kind: LedgerKind::QuestBudget,
            quest_id: Some(Uuid::new_v4()),
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            note: None,
        };
        let bytes = bincode::serialize(&entry).unwrap();
        let back: LedgerEntry = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, entry);
    }
}
