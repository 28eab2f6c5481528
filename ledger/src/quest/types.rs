//! Quest definitions and their status lifecycle.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{MAX_COIN_AMOUNT, MAX_TITLE_LEN};
use crate::error::{LedgerError, LedgerResult};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Where a quest is in its review lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Being written. Invisible to students.
    Draft,
    /// Waiting for a master admin.
    Submitted,
    /// Funded and live.
    Approved,
    /// Turned down. Terminal.
    Rejected,
}

impl QuestStatus {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: QuestStatus) -> bool {
        matches!(
            (self, next),
            (QuestStatus::Draft, QuestStatus::Submitted)
                | (QuestStatus::Submitted, QuestStatus::Approved)
                | (QuestStatus::Submitted, QuestStatus::Rejected)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestStatus::Draft => "draft",
            QuestStatus::Submitted => "submitted",
            QuestStatus::Approved => "approved",
            QuestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// One answer option of an MCQ quest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqOption {
    pub text: String,
    #[serde(rename = "isCorrect", default)]
    pub is_correct: bool,
}

/// Type-specific quest configuration.
///
/// Serialized externally tagged, e.g.
/// `{"mcq": {"question": "...", "options": {"a": {"text": "...", "isCorrect": true}}}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestConfig {
    /// Auto-graded multiple choice. Option keys are matched case-sensitively.
    Mcq {
        question: String,
        options: BTreeMap<String, McqOption>,
    },
    /// Free-text answer reviewed by staff.
    Text {
        prompt: String,
        rubric: Option<String>,
    },
}

impl QuestConfig {
    /// Short name of the answer type this config accepts.
    pub fn answer_kind(&self) -> &'static str {
        match self {
            QuestConfig::Mcq { .. } => "mcq",
            QuestConfig::Text { .. } => "text",
        }
    }

    /// Returns a copy with every `isCorrect` flag cleared.
    pub fn redacted(&self) -> QuestConfig {
        match self {
            QuestConfig::Mcq { question, options } => QuestConfig::Mcq {
                question: question.clone(),
                options: options
                    .iter()
                    .map(|(key, opt)| {
                        (
                            key.clone(),
                            McqOption {
                                text: opt.text.clone(),
                                is_correct: false,
                            },
                        )
                    })
                    .collect(),
            },
            QuestConfig::Text { prompt, .. } => QuestConfig::Text {
                prompt: prompt.clone(),
                rubric: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Quest
// ---------------------------------------------------------------------------

/// A quest definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Coins paid per correct/accepted submission. Always positive.
    pub reward_coins: u64,
    pub status: QuestStatus,
    /// The CHESS attribute this quest develops, if categorized.
    pub attribute_id: Option<Uuid>,
    pub config: QuestConfig,
    /// Whether the quest currently accepts submissions (once approved).
    pub active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quest {
    /// Returns `true` if students may submit answers right now.
    pub fn is_open(&self) -> bool {
        self.status == QuestStatus::Approved && self.active
    }

    /// Moves the quest to `next`, or fails with
    /// [`LedgerError::InvalidTransition`].
    pub fn transition(&mut self, next: QuestStatus, now: DateTime<Utc>) -> LedgerResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// The reward as a ledger delta magnitude.
    pub fn reward_delta(&self) -> i64 {
        // Bounded by MAX_COIN_AMOUNT at creation.
        self.reward_coins as i64
    }

    /// Returns a copy safe to show to students: answer keys and rubrics
    /// are stripped.
    pub fn redacted(&self) -> Quest {
        Quest {
            config: self.config.redacted(),
            ..self.clone()
        }
    }
}

/// Input for `create_quest`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewQuest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub reward_coins: u64,
    #[serde(default)]
    pub attribute_id: Option<Uuid>,
    pub config: QuestConfig,
}

impl NewQuest {
    /// Checks the caller-supplied fields (not the config; see
    /// [`super::grading::validate_config`]).
    pub fn validate(&self) -> LedgerResult<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(LedgerError::Validation("title must not be empty".into()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(LedgerError::Validation(format!(
                "title exceeds {MAX_TITLE_LEN} characters"
            )));
        }
        if self.reward_coins == 0 {
            return Err(LedgerError::Validation(
                "reward_coins must be positive".into(),
            ));
        }
        if self.reward_coins > MAX_COIN_AMOUNT {
            return Err(LedgerError::Validation(format!(
                "reward_coins exceeds {MAX_COIN_AMOUNT}"
            )));
        }
        Ok(())
    }

    /// Builds the draft quest. Call after validation.
    pub fn into_quest(self, id: Uuid, created_by: Uuid, now: DateTime<Utc>) -> Quest {
        Quest {
            id,
            title: self.title.trim().to_string(),
            description: self.description,
            reward_coins: self.reward_coins,
            status: QuestStatus::Draft,
            attribute_id: self.attribute_id,
            config: self.config,
            active: true,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}
