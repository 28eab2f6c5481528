//! Error types for the ledger.
//!
//! Every procedure returns a [`LedgerError`]. The messages are user-facing:
//! the frontend shows them verbatim in a toast, so they read like sentences
//! rather than debug output.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use thiserror::Error;
use uuid::Uuid;

use crate::quest::QuestStatus;
use crate::role::Role;

/// Convenience alias used throughout the crate.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while reading or mutating the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The caller's role is below what the action requires.
    #[error("{0}")]
    Forbidden(String),

    #[error("quest not found: {0}")]
    QuestNotFound(Uuid),

    #[error("submission not found: {0}")]
    SubmissionNotFound(Uuid),

    #[error("profile not found: {0}")]
    ProfileNotFound(Uuid),

    /// The quest is not in the status the operation requires.
    #[error("invalid status transition: quest is {from}, cannot become {to}")]
    InvalidTransition {
        /// The quest's current status.
        from: QuestStatus,
        /// The status the operation tried to move it to.
        to: QuestStatus,
    },

    /// The approving admin cannot fund the quest's reward.
    #[error("Insufficient balance to approve quest (need {need} coins)")]
    InsufficientBalance {
        /// The quest's reward, which must be pre-funded.
        need: u64,
        /// The admin's balance at the time of the attempt.
        available: u64,
    },

    /// The quest exists but is not approved and active.
    #[error("quest {0} is not open for submissions")]
    QuestUnavailable(Uuid),

    /// An MCQ answer was sent to a text quest or vice versa.
    #[error("quest {quest_id} does not accept {expected} answers")]
    WrongQuestType {
        quest_id: Uuid,
        expected: &'static str,
    },

    /// The submitted MCQ key is not one of the quest's options.
    #[error("invalid choice: {0}")]
    InvalidChoice(String),

    #[error("already submitted an answer for quest {0}")]
    AlreadySubmitted(Uuid),

    #[error("submission {0} has already been reviewed")]
    AlreadyReviewed(Uuid),

    /// The quest's configuration breaks a structural rule (e.g. not exactly
    /// one correct MCQ option).
    #[error("quest configuration invalid: {0}")]
    InvalidQuestConfig(String),

    /// A caller-supplied value failed validation.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("balance overflow: current {current}, delta {delta}")]
    BalanceOverflow { current: u64, delta: i64 },

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("migration {version} ({name}) failed: {reason}")]
    Migration {
        version: u64,
        name: &'static str,
        reason: String,
    },
}

impl LedgerError {
    /// Builds the rejection for a caller below `required`.
    ///
    /// Produces "Only master_admin can approve quests" for the top role and
    /// "Only staff and above can create quests" otherwise.
    pub fn requires(required: Role, action: &str) -> Self {
        if required == Role::MasterAdmin {
            LedgerError::Forbidden(format!("Only {required} can {action}"))
        } else {
            LedgerError::Forbidden(format!("Only {required} and above can {action}"))
        }
    }

    /// Classifies the error for transport mapping.
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::Forbidden(_) => ErrorCode::Forbidden,
            LedgerError::QuestNotFound(_)
            | LedgerError::SubmissionNotFound(_)
            | LedgerError::ProfileNotFound(_) => ErrorCode::NotFound,
            LedgerError::InvalidTransition { .. }
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::QuestUnavailable(_)
            | LedgerError::AlreadySubmitted(_)
            | LedgerError::AlreadyReviewed(_) => ErrorCode::Conflict,
            LedgerError::WrongQuestType { .. }
            | LedgerError::InvalidChoice(_)
            | LedgerError::InvalidQuestConfig(_)
            | LedgerError::Validation(_) => ErrorCode::Validation,
            LedgerError::BalanceOverflow { .. }
            | LedgerError::Storage(_)
            | LedgerError::Serialization(_)
            | LedgerError::Migration { .. } => ErrorCode::Internal,
        }
    }
}

/// Coarse error classes, used by the node to pick HTTP statuses and
/// JSON-RPC codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    Internal,
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<TransactionError<LedgerError>> for LedgerError {
    fn from(e: TransactionError<LedgerError>) -> Self {
        match e {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(inner) => LedgerError::Storage(inner),
        }
    }
}

impl From<LedgerError> for ConflictableTransactionError<LedgerError> {
    fn from(e: LedgerError) -> Self {
        ConflictableTransactionError::Abort(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_message_names_the_need() {
        let err = LedgerError::InsufficientBalance {
            need: 20,
            available: 15,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance to approve quest (need 20 coins)"
        );
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[test]
    fn requires_phrases_master_admin_exclusively() {
        let err = LedgerError::requires(Role::MasterAdmin, "approve quests");
        assert_eq!(err.to_string(), "Only master_admin can approve quests");

        let err = LedgerError::requires(Role::Staff, "create quests");
        assert_eq!(err.to_string(), "Only staff and above can create quests");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[test]
    fn transaction_abort_unwraps_to_inner_error() {
        let wrapped: TransactionError<LedgerError> =
            TransactionError::Abort(LedgerError::QuestNotFound(Uuid::nil()));
        let err: LedgerError = wrapped.into();
        assert!(matches!(err, LedgerError::QuestNotFound(_)));
    }
}
