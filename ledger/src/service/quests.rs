//! Quest authoring, approval, and reads.
//!
//! Approval is the only step with a ledger effect: the master admin pays the
//! quest's reward into the system up front, as a `quest_budget` debit from
//! their own wallet. The status check and the debit share one transaction,
//! so a quest can be funded at most once.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{require, Approval, LedgerService, Posting};
use crate::error::{LedgerError, LedgerResult};
use crate::quest::{validate_config, NewQuest, Quest, QuestStatus};
use crate::role::{Principal, Role};
use crate::wallet::LedgerKind;

impl LedgerService {
    /// Creates a new `draft` quest owned by the caller.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Forbidden`] below staff.
    /// - [`LedgerError::Validation`] for a blank title or a bad reward.
    /// - [`LedgerError::InvalidQuestConfig`] for a malformed config.
    pub fn create_quest(&self, caller: &Principal, new: NewQuest) -> LedgerResult<Quest> {
        require(caller, Role::Staff, "create quests")?;
        new.validate()?;
        validate_config(&new.config)?;

        let quest = new.into_quest(Uuid::new_v4(), caller.user_id, Utc::now());
        self.db.transact(|tx| tx.put_quest(&quest))?;

        info!(
            quest = %quest.id,
            creator = %caller.user_id,
            kind = quest.config.answer_kind(),
            reward = quest.reward_coins,
            "Quest created"
        );
        Ok(quest)
    }

    /// Sends a draft quest for master-admin review. Only the creator may.
    pub fn submit_quest(&self, caller: &Principal, quest_id: Uuid) -> LedgerResult<Quest> {
        let now = Utc::now();
        let quest = self.db.transact(|tx| {
            let mut quest = tx.require_quest(quest_id)?;
            if quest.created_by != caller.user_id {
                return Err(LedgerError::Forbidden(
                    "Only the quest creator can submit it for review".into(),
                )
                .into());
            }
            quest.transition(QuestStatus::Submitted, now)?;
            tx.put_quest(&quest)?;
            Ok(quest)
        })?;

        info!(quest = %quest_id, "Quest submitted for review");
        Ok(quest)
    }

    /// Approves a submitted quest, debiting its reward from the caller's
    /// wallet.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Forbidden`] unless the caller is a master admin.
    /// - [`LedgerError::QuestNotFound`] if the quest does not exist.
    /// - [`LedgerError::InvalidTransition`] if the quest is not `submitted`,
    ///   including when a concurrent approval got there first.
    /// - [`LedgerError::InsufficientBalance`] if the caller cannot fund it.
    ///
    /// Nothing is written on error.
    pub fn approve_quest(&self, caller: &Principal, quest_id: Uuid) -> LedgerResult<Approval> {
        require(caller, Role::MasterAdmin, "approve quests")?;

        let now = Utc::now();
        let result = self.db.transact(|tx| {
            let mut quest = tx.require_quest(quest_id)?;
            quest.transition(QuestStatus::Approved, now)?;

            let wallet = tx.wallet_or_create(caller.user_id, now)?;
            if !wallet.covers(quest.reward_coins) {
                return Err(LedgerError::InsufficientBalance {
                    need: quest.reward_coins,
                    available: wallet.balance,
                }
                .into());
            }

            let (entry, wallet) = tx.post(
                caller.user_id,
                -quest.reward_delta(),
                LedgerKind::QuestBudget,
                Some(quest.id),
                caller.user_id,
                None,
                now,
            )?;
            tx.put_quest(&quest)?;

            Ok(Approval {
                quest,
                budget: Posting { entry, wallet },
            })
        });

        match &result {
            Ok(approval) => info!(
                quest = %quest_id,
                admin = %caller.user_id,
                budget = approval.quest.reward_coins,
                balance = approval.budget.wallet.balance,
                "Quest approved"
            ),
            Err(e) => debug!(quest = %quest_id, admin = %caller.user_id, error = %e, "Approval refused"),
        }
        result
    }

    /// Rejects a submitted quest. No coins move.
    pub fn reject_quest(&self, caller: &Principal, quest_id: Uuid) -> LedgerResult<Quest> {
        require(caller, Role::MasterAdmin, "reject quests")?;

        let now = Utc::now();
        let quest = self.db.transact(|tx| {
            let mut quest = tx.require_quest(quest_id)?;
            quest.transition(QuestStatus::Rejected, now)?;
            tx.put_quest(&quest)?;
            Ok(quest)
        })?;

        info!(quest = %quest_id, admin = %caller.user_id, "Quest rejected");
        Ok(quest)
    }

    /// Opens or closes a quest for submissions.
    pub fn set_quest_active(
        &self,
        caller: &Principal,
        quest_id: Uuid,
        active: bool,
    ) -> LedgerResult<Quest> {
        require(caller, Role::Staff, "change quest availability")?;

        let now = Utc::now();
        let quest = self.db.transact(|tx| {
            let mut quest = tx.require_quest(quest_id)?;
            if quest.active != active {
                quest.active = active;
                quest.updated_at = now;
                tx.put_quest(&quest)?;
            }
            Ok(quest)
        })?;

        info!(quest = %quest_id, active, "Quest availability set");
        Ok(quest)
    }

    /// Reads one quest as the caller is allowed to see it.
    ///
    /// Callers below staff only see open quests, with answer keys stripped.
    /// A hidden quest reads as not found.
    pub fn get_quest(&self, caller: &Principal, quest_id: Uuid) -> LedgerResult<Quest> {
        let quest = self
            .db
            .get_quest(quest_id)?
            .ok_or(LedgerError::QuestNotFound(quest_id))?;

        if caller.can(Role::Staff) {
            Ok(quest)
        } else if quest.is_open() {
            Ok(quest.redacted())
        } else {
            Err(LedgerError::QuestNotFound(quest_id))
        }
    }

    /// Lists quests visible to the caller, newest first, optionally filtered
    /// by status.
    pub fn list_quests(
        &self,
        caller: &Principal,
        status: Option<QuestStatus>,
    ) -> LedgerResult<Vec<Quest>> {
        let staff = caller.can(Role::Staff);
        let quests = self
            .db
            .all_quests()?
            .into_iter()
            .filter(|q| status.map_or(true, |s| q.status == s))
            .filter_map(|q| {
                if staff {
                    Some(q)
                } else if q.is_open() {
                    Some(q.redacted())
                } else {
                    None
                }
            })
            .collect();
        Ok(quests)
    }
}
