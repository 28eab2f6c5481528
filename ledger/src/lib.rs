// Copyright (c) 2026 CHESS Map Contributors. MIT License.
// See LICENSE for details.

//! # CHESS Map Ledger — Core Library
//!
//! Students earn coins by completing quests; admins fund the rewards out of
//! their own wallets before a quest goes live. This crate is the bookkeeping
//! behind that: wallets, an append-only ledger whose sum always reconstructs
//! every balance, the quest lifecycle, and the grading procedures that pay
//! out rewards.
//!
//! ## Architecture
//!
//! - **role** — The four-level role hierarchy and the authenticated principal.
//! - **wallet** — Wallet records and ledger entries.
//! - **quest** — Quest definitions, submissions, and MCQ grading.
//! - **profile** — User profiles and the role-change audit trail.
//! - **storage** — sled-backed persistence and schema migrations.
//! - **service** — The transactional procedures callers actually invoke.
//! - **config** — Constants: scores, pagination bounds, reward limits.
//! - **error** — The one error type every procedure returns.
//!
//! ## Ground Rules
//!
//! 1. Every balance change is a ledger entry. No exceptions, no backdoors.
//! 2. Every procedure is one store transaction. It either lands whole or not
//!    at all.
//! 3. Balances are `u64`, deltas are `i64`. Nobody goes negative.

pub mod config;
pub mod error;
pub mod profile;
pub mod quest;
pub mod role;
pub mod service;
pub mod storage;
pub mod wallet;

pub use error::{ErrorCode, LedgerError, LedgerResult};
pub use role::{Principal, Role};
pub use service::LedgerService;
pub use storage::LedgerDB;
