//! # Quest Configuration Validation & MCQ Grading
//!
//! An MCQ quest must have exactly one option flagged correct. That rule is
//! checked when the quest is created, and checked again at grading time so
//! that a config which somehow violates it is refused instead of graded by
//! whatever order the map happens to iterate in.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::types::{McqOption, QuestConfig};
use crate::config::{FULL_SCORE, MIN_MCQ_OPTIONS, ZERO_SCORE};
use crate::error::{LedgerError, LedgerResult};

/// Outcome of grading a single MCQ answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McqGrade {
    pub correct: bool,
    pub score: u8,
}

/// Validates a quest configuration for creation.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidQuestConfig`] when an MCQ has fewer than
/// [`MIN_MCQ_OPTIONS`] options, a blank key, or anything other than exactly
/// one correct option, or when a text quest has a blank prompt.
pub fn validate_config(config: &QuestConfig) -> LedgerResult<()> {
    match config {
        QuestConfig::Mcq { question, options } => {
            if question.trim().is_empty() {
                return Err(LedgerError::InvalidQuestConfig(
                    "mcq question must not be empty".into(),
                ));
            }
            if options.len() < MIN_MCQ_OPTIONS {
                return Err(LedgerError::InvalidQuestConfig(format!(
                    "mcq needs at least {MIN_MCQ_OPTIONS} options, got {}",
                    options.len()
                )));
            }
            if options.keys().any(|k| k.trim().is_empty()) {
                return Err(LedgerError::InvalidQuestConfig(
                    "mcq option keys must not be blank".into(),
                ));
            }
            correct_choice(options).map(|_| ())
        }
        QuestConfig::Text { prompt, .. } => {
            if prompt.trim().is_empty() {
                return Err(LedgerError::InvalidQuestConfig(
                    "text prompt must not be empty".into(),
                ));
            }
            Ok(())
        }
    }
}

/// Returns the key of the single option flagged correct.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidQuestConfig`] if zero or several options
/// are flagged.
pub fn correct_choice(options: &BTreeMap<String, McqOption>) -> LedgerResult<&str> {
    let mut flagged = options
        .iter()
        .filter(|(_, opt)| opt.is_correct)
        .map(|(key, _)| key.as_str());

    match (flagged.next(), flagged.next()) {
        (Some(key), None) => Ok(key),
        (None, _) => Err(LedgerError::InvalidQuestConfig(
            "no option is marked correct".into(),
        )),
        (Some(_), Some(_)) => Err(LedgerError::InvalidQuestConfig(
            "more than one option is marked correct".into(),
        )),
    }
}

/// Grades `choice` against an MCQ quest's configuration.
///
/// Key comparison is exact and case-sensitive.
///
/// # Errors
///
/// - [`LedgerError::WrongQuestType`] if the quest is not an MCQ.
/// - [`LedgerError::InvalidChoice`] if `choice` is not one of the option keys.
/// - [`LedgerError::InvalidQuestConfig`] if the stored answer key is broken.
pub fn grade_mcq(quest_id: Uuid, config: &QuestConfig, choice: &str) -> LedgerResult<McqGrade> {
    let options = match config {
        QuestConfig::Mcq { options, .. } => options,
        QuestConfig::Text { .. } => {
            return Err(LedgerError::WrongQuestType {
                quest_id,
                expected: "mcq",
            })
        }
    };

    if !options.contains_key(choice) {
        return Err(LedgerError::InvalidChoice(choice.to_string()));
    }

    let correct = correct_choice(options)? == choice;
    Ok(McqGrade {
        correct,
        score: if correct { FULL_SCORE } else { ZERO_SCORE },
    })
}
