//! Student submissions.
//!
//! A student gets one submission per quest. MCQ submissions are graded on
//! the spot (`autograded` or `rejected`); text submissions start `pending`
//! and wait for a staff review (`accepted` or `rejected`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Review state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Correct MCQ answer, graded automatically.
    Autograded,
    /// Text answer accepted by staff.
    Accepted,
    /// Incorrect MCQ answer, or text answer turned down.
    Rejected,
    /// Text answer waiting for review.
    Pending,
}

impl SubmissionStatus {
    /// Returns `true` if this submission earned the quest reward.
    pub fn is_rewarded(self) -> bool {
        matches!(self, SubmissionStatus::Autograded | SubmissionStatus::Accepted)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionStatus::Autograded => "autograded",
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Pending => "pending",
        };
        f.write_str(s)
    }
}

/// One student's answer to one quest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub quest_id: Uuid,
    pub user_id: Uuid,
    pub status: SubmissionStatus,
    /// Option key for MCQ quests.
    pub mcq_choice: Option<String>,
    /// Answer body for text quests.
    pub text_answer: Option<String>,
    /// 0–100 once graded; `None` while pending.
    pub score: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
}

impl Submission {
    /// An auto-graded MCQ submission. The grade is final on creation.
    pub fn graded_mcq(
        id: Uuid,
        quest_id: Uuid,
        user_id: Uuid,
        choice: &str,
        correct: bool,
        score: u8,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            quest_id,
            user_id,
            status: if correct {
                SubmissionStatus::Autograded
            } else {
                SubmissionStatus::Rejected
            },
            mcq_choice: Some(choice.to_string()),
            text_answer: None,
            score: Some(score),
            created_at: now,
            reviewed_at: Some(now),
            reviewed_by: None,
        }
    }

    /// A text submission awaiting staff review.
    pub fn pending_text(
        id: Uuid,
        quest_id: Uuid,
        user_id: Uuid,
        answer: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            quest_id,
            user_id,
            status: SubmissionStatus::Pending,
            mcq_choice: None,
            text_answer: Some(answer),
            score: None,
            created_at: now,
            reviewed_at: None,
            reviewed_by: None,
        }
    }

    /// Records a staff decision on a pending submission.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AlreadyReviewed`] if the submission is not
    /// pending. The submission is unchanged on error.
    pub fn review(
        &mut self,
        accept: bool,
        score: u8,
        reviewer: Uuid,
        now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        if self.status != SubmissionStatus::Pending {
            return Err(LedgerError::AlreadyReviewed(self.id));
        }
        self.status = if accept {
            SubmissionStatus::Accepted
        } else {
            SubmissionStatus::Rejected
        };
        self.score = Some(score);
        self.reviewed_at = Some(now);
        self.reviewed_by = Some(reviewer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcq_status_follows_correctness() {
        let ok = Submission::graded_mcq(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "a",
            true,
            100,
            Utc::now(),
        );
        assert_eq!(ok.status, SubmissionStatus::Autograded);
        assert!(ok.status.is_rewarded());

        let bad = Submission::graded_mcq(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "b",
            false,
            0,
            Utc::now(),
        );
        assert_eq!(bad.status, SubmissionStatus::Rejected);
        assert_eq!(bad.score, Some(0));
        assert!(!bad.status.is_rewarded());
    }

    #[test]
    fn review_only_once() {
        let reviewer = Uuid::new_v4();
        let mut sub = Submission::pending_text(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Control the center".into(),
            Utc::now(),
        );
        assert_eq!(sub.score, None);

        sub.review(true, 90, reviewer, Utc::now()).unwrap();
        assert_eq!(sub.status, SubmissionStatus::Accepted);
        assert_eq!(sub.score, Some(90));
        assert_eq!(sub.reviewed_by, Some(reviewer));

        let err = sub.review(false, 0, reviewer, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyReviewed(_)));
        assert_eq!(sub.status, SubmissionStatus::Accepted);
    }
}
