//! Answer submission and grading.
//!
//! MCQ answers are graded on the spot; text answers wait for staff. Either
//! way the reward, if earned, is credited in the same transaction that
//! records the outcome, and a student gets exactly one submission per quest.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::{require, Graded, LedgerService, Posting};
use crate::config::{FULL_SCORE, MAX_TEXT_ANSWER_LEN, ZERO_SCORE};
use crate::error::{LedgerError, LedgerResult};
use crate::quest::{grade_mcq, Quest, QuestConfig, Submission, SubmissionStatus};
use crate::role::{Principal, Role};
use crate::storage::{Tx, TxResult};
use crate::wallet::LedgerKind;

/// Loads a quest and checks it accepts submissions right now.
fn open_quest(tx: &Tx<'_>, quest_id: Uuid) -> TxResult<Quest> {
    let quest = tx.require_quest(quest_id)?;
    if !quest.is_open() {
        return Err(LedgerError::QuestUnavailable(quest_id).into());
    }
    Ok(quest)
}

/// Credits a quest's reward to the submitting student.
fn pay_reward(
    tx: &Tx<'_>,
    quest: &Quest,
    sub: &Submission,
    by: Uuid,
    now: DateTime<Utc>,
) -> TxResult<Posting> {
    let (entry, wallet) = tx.post(
        sub.user_id,
        quest.reward_delta(),
        LedgerKind::QuestAward,
        Some(quest.id),
        by,
        None,
        now,
    )?;
    Ok(Posting { entry, wallet })
}

impl LedgerService {
    /// Grades an MCQ answer and pays the reward if it is correct.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::QuestNotFound`] / [`LedgerError::QuestUnavailable`]
    ///   if the quest is missing, unapproved, or inactive.
    /// - [`LedgerError::WrongQuestType`] for a text quest.
    /// - [`LedgerError::InvalidChoice`] if `choice` is not an option key.
    /// - [`LedgerError::AlreadySubmitted`] on a second attempt.
    pub fn submit_mcq_answer(
        &self,
        caller: &Principal,
        quest_id: Uuid,
        choice: &str,
    ) -> LedgerResult<Graded> {
        let now = Utc::now();
        let submission_id = Uuid::new_v4();

        let graded = self.db.transact(|tx| {
            let quest = open_quest(tx, quest_id)?;
            let grade = grade_mcq(quest_id, &quest.config, choice)?;

            let submission = Submission::graded_mcq(
                submission_id,
                quest_id,
                caller.user_id,
                choice,
                grade.correct,
                grade.score,
                now,
            );
            tx.insert_submission(&submission)?;

            let award = if grade.correct {
                Some(pay_reward(tx, &quest, &submission, caller.user_id, now)?)
            } else {
                None
            };
            Ok(Graded { submission, award })
        });

        match &graded {
            Ok(g) => info!(
                quest = %quest_id,
                user = %caller.user_id,
                status = %g.submission.status,
                awarded = g.award.as_ref().map_or(0, |p| p.entry.delta),
                "MCQ answer graded"
            ),
            Err(e) => debug!(quest = %quest_id, user = %caller.user_id, error = %e, "MCQ answer refused"),
        }
        graded
    }

    /// Records a free-text answer for staff review.
    pub fn submit_text_answer(
        &self,
        caller: &Principal,
        quest_id: Uuid,
        answer: &str,
    ) -> LedgerResult<Submission> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(LedgerError::Validation("answer must not be empty".into()));
        }
        if answer.chars().count() > MAX_TEXT_ANSWER_LEN {
            return Err(LedgerError::Validation(format!(
                "answer exceeds {MAX_TEXT_ANSWER_LEN} characters"
            )));
        }

        let now = Utc::now();
        let submission_id = Uuid::new_v4();
        let submission = self.db.transact(|tx| {
            let quest = open_quest(tx, quest_id)?;
            if !matches!(quest.config, QuestConfig::Text { .. }) {
                return Err(LedgerError::WrongQuestType {
                    quest_id,
                    expected: "text",
                }
                .into());
            }
            let submission =
                Submission::pending_text(submission_id, quest_id, caller.user_id, answer.to_string(), now);
            tx.insert_submission(&submission)?;
            Ok(submission)
        })?;

        info!(quest = %quest_id, user = %caller.user_id, submission = %submission.id, "Text answer submitted");
        Ok(submission)
    }

    /// Accepts or rejects a pending text submission. Accepting pays the
    /// quest's reward to the student.
    ///
    /// `score` defaults to 100 on accept and is forced to 0 on reject.
    pub fn review_submission(
        &self,
        caller: &Principal,
        submission_id: Uuid,
        accept: bool,
        score: Option<u8>,
    ) -> LedgerResult<Graded> {
        require(caller, Role::Staff, "review submissions")?;

        let score = if accept {
            let score = score.unwrap_or(FULL_SCORE);
            if score > FULL_SCORE {
                return Err(LedgerError::Validation(format!(
                    "score must be at most {FULL_SCORE}"
                )));
            }
            score
        } else {
            ZERO_SCORE
        };

        let now = Utc::now();
        let graded = self.db.transact(|tx| {
            let mut submission = tx
                .submission(submission_id)?
                .ok_or(LedgerError::SubmissionNotFound(submission_id))?;
            submission.review(accept, score, caller.user_id, now)?;
            tx.put_submission(&submission)?;

            let award = if accept {
                let quest = tx.require_quest(submission.quest_id)?;
                Some(pay_reward(tx, &quest, &submission, caller.user_id, now)?)
            } else {
                None
            };
            Ok(Graded { submission, award })
        })?;

        info!(
            submission = %submission_id,
            reviewer = %caller.user_id,
            status = %graded.submission.status,
            "Submission reviewed"
        );
        Ok(graded)
    }

    /// The caller's own submissions, newest first.
    pub fn list_my_submissions(&self, caller: &Principal) -> LedgerResult<Vec<Submission>> {
        Ok(self
            .db
            .all_submissions()?
            .into_iter()
            .filter(|s| s.user_id == caller.user_id)
            .collect())
    }

    /// Every submission still waiting for review, oldest first.
    pub fn list_pending_submissions(&self, caller: &Principal) -> LedgerResult<Vec<Submission>> {
        require(caller, Role::Staff, "review submissions")?;
        let mut pending: Vec<Submission> = self
            .db
            .all_submissions()?
            .into_iter()
            .filter(|s| s.status == SubmissionStatus::Pending)
            .collect();
        pending.reverse();
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn correct_choice_awards_reward() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let quest = live_quest(&svc, &admin, mcq_quest(20));
        let student = principal(Role::Student);

        let graded = svc.submit_mcq_answer(&student, quest, "b").unwrap();
        assert_eq!(graded.submission.status, SubmissionStatus::Autograded);
        assert_eq!(graded.submission.score, Some(100));

        let award = graded.award.unwrap();
        assert_eq!(award.entry.delta, 20);
        assert_eq!(award.entry.kind, LedgerKind::QuestAward);
        assert_eq!(award.wallet.balance, 20);
    }

    #[test]
    fn wrong_choice_pays_nothing() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let quest = live_quest(&svc, &admin, mcq_quest(20));
        let student = principal(Role::Student);

        let graded = svc.submit_mcq_answer(&student, quest, "a").unwrap();
        assert_eq!(graded.submission.status, SubmissionStatus::Rejected);
        assert_eq!(graded.submission.score, Some(0));
        assert!(graded.award.is_none());
        assert!(svc.db().ledger_entries(student.user_id).unwrap().is_empty());
    }

    #[test]
    fn second_attempt_is_refused() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let quest = live_quest(&svc, &admin, mcq_quest(20));
        let student = principal(Role::Student);

        svc.submit_mcq_answer(&student, quest, "a").unwrap();
        assert!(matches!(
            svc.submit_mcq_answer(&student, quest, "b"),
            Err(LedgerError::AlreadySubmitted(_))
        ));
        assert!(svc.db().get_wallet(student.user_id).unwrap().is_none());
    }

    #[test]
    fn invalid_choice_records_nothing() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let quest = live_quest(&svc, &admin, mcq_quest(20));
        let student = principal(Role::Student);

        assert!(matches!(
            svc.submit_mcq_answer(&student, quest, "B"),
            Err(LedgerError::InvalidChoice(_))
        ));
        assert_eq!(svc.db().submission_count(), 0);
        // The student can still answer properly afterwards.
        assert!(svc.submit_mcq_answer(&student, quest, "b").is_ok());
    }

    #[test]
    fn closed_quests_refuse_answers() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let draft = svc.create_quest(&admin, mcq_quest(20)).unwrap();
        let student = principal(Role::Student);

        assert!(matches!(
            svc.submit_mcq_answer(&student, draft.id, "b"),
            Err(LedgerError::QuestUnavailable(_))
        ));

        let live = live_quest(&svc, &admin, mcq_quest(20));
        svc.set_quest_active(&admin, live, false).unwrap();
        assert!(matches!(
            svc.submit_mcq_answer(&student, live, "b"),
            Err(LedgerError::QuestUnavailable(_))
        ));
    }

    #[test]
    fn answer_types_must_match() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let mcq = live_quest(&svc, &admin, mcq_quest(10));
        let text = live_quest(&svc, &admin, text_quest(10));
        let student = principal(Role::Student);

        assert!(matches!(
            svc.submit_mcq_answer(&student, text, "a"),
            Err(LedgerError::WrongQuestType { expected: "mcq", .. })
        ));
        assert!(matches!(
            svc.submit_text_answer(&student, mcq, "e4"),
            Err(LedgerError::WrongQuestType { expected: "text", .. })
        ));
    }

    #[test]
    fn accepted_text_answer_is_paid() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let quest = live_quest(&svc, &admin, text_quest(15));
        let student = principal(Role::Student);
        let staff = principal(Role::Staff);

        let sub = svc
            .submit_text_answer(&student, quest, "Develop knights, castle early")
            .unwrap();
        assert_eq!(sub.status, SubmissionStatus::Pending);
        assert_eq!(svc.list_pending_submissions(&staff).unwrap().len(), 1);

        let graded = svc.review_submission(&staff, sub.id, true, Some(80)).unwrap();
        assert_eq!(graded.submission.status, SubmissionStatus::Accepted);
        assert_eq!(graded.submission.score, Some(80));
        assert_eq!(graded.submission.reviewed_by, Some(staff.user_id));
        assert_eq!(graded.award.unwrap().wallet.balance, 15);

        assert!(matches!(
            svc.review_submission(&staff, sub.id, true, None),
            Err(LedgerError::AlreadyReviewed(_))
        ));
        assert!(svc.list_pending_submissions(&staff).unwrap().is_empty());
    }

    #[test]
    fn rejected_text_answer_scores_zero() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let quest = live_quest(&svc, &admin, text_quest(15));
        let student = principal(Role::Student);

        let sub = svc.submit_text_answer(&student, quest, "pawns").unwrap();
        let graded = svc.review_submission(&admin, sub.id, false, Some(70)).unwrap();
        assert_eq!(graded.submission.status, SubmissionStatus::Rejected);
        assert_eq!(graded.submission.score, Some(0));
        assert!(graded.award.is_none());
    }

    #[test]
    fn review_rules() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let quest = live_quest(&svc, &admin, text_quest(15));
        let student = principal(Role::Student);
        let sub = svc.submit_text_answer(&student, quest, "center").unwrap();

        assert!(matches!(
            svc.review_submission(&student, sub.id, true, None),
            Err(LedgerError::Forbidden(_))
        ));
        assert!(matches!(
            svc.review_submission(&admin, sub.id, true, Some(101)),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            svc.review_submission(&admin, Uuid::new_v4(), true, None),
            Err(LedgerError::SubmissionNotFound(_))
        ));
        assert!(matches!(
            svc.submit_text_answer(&student, quest, "   "),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn my_submissions_are_mine_only() {
        let svc = service();
        let admin = funded_admin(&svc, 100);
        let q1 = live_quest(&svc, &admin, mcq_quest(5));
        let q2 = live_quest(&svc, &admin, mcq_quest(5));
        let alice = principal(Role::Student);
        let bob = principal(Role::Student);

        svc.submit_mcq_answer(&alice, q1, "b").unwrap();
        svc.submit_mcq_answer(&alice, q2, "a").unwrap();
        svc.submit_mcq_answer(&bob, q1, "b").unwrap();

        let mine = svc.list_my_submissions(&alice).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|s| s.user_id == alice.user_id));
    }
}
