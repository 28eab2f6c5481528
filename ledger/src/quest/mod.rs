//! # Quest Module
//!
//! Quests are the tasks students complete for coins. Each quest carries a
//! reward, a lifecycle status, and a type-specific configuration (an MCQ
//! with an answer key, or a free-text prompt reviewed by staff).
//!
//! ```text
//! types.rs       — Quest, status lifecycle, typed configuration
//! submission.rs  — Student submissions and their review states
//! grading.rs     — Configuration validation and MCQ auto-grading
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! draft ──(creator)──▶ submitted ──(master admin)──▶ approved
//!                          │
//!                          └──────(master admin)──▶ rejected
//! ```
//!
//! Approval is irreversible and is the moment the reward budget leaves the
//! approving admin's wallet.

pub mod grading;
pub mod submission;
pub mod types;

pub use grading::{correct_choice, grade_mcq, validate_config, McqGrade};
pub use submission::{Submission, SubmissionStatus};
pub use types::{McqOption, NewQuest, Quest, QuestConfig, QuestStatus};
