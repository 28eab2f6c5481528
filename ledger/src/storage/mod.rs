//! # Storage Module
//!
//! Persistent storage for wallets, the ledger, quests, submissions, and
//! profiles, built on sled.
//!
//! ```text
//! db.rs          — LedgerDB: tree layout, typed reads, transactional view
//! migrations.rs  — Ordered schema migrations applied on open
//! ```
//!
//! ## Design Decisions
//!
//! 1. **One tree per table.** Wallets, ledger entries, quests, submissions,
//!    the submission uniqueness index, profiles, and the role audit log each
//!    get their own keyspace.
//!
//! 2. **Multi-tree transactions for every write.** A procedure that touches
//!    a wallet, the ledger, and a quest does so in a single serializable sled
//!    transaction. Readers never observe a wallet without its ledger entry.
//!
//! 3. **Bincode on disk.** JSON is for the API; bincode is for storage.

pub mod db;
pub mod migrations;

pub use db::{LedgerDB, Tx, TxResult};
pub use migrations::{Migration, MIGRATIONS};
