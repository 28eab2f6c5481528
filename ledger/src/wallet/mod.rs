//! # Wallet Module — Balances & the Ledger
//!
//! Coins live in two places that must always agree: the per-user
//! [`Wallet`] row, which holds the current balance, and the append-only
//! [`LedgerEntry`] log, whose deltas sum to that balance.
//!
//! ```text
//! balance.rs  — Wallet record with checked delta application
//! entry.rs    — Ledger entries and their kinds
//! ```
//!
//! Neither type writes to storage on its own. The service layer pairs
//! every wallet mutation with exactly one ledger insert inside a single
//! store transaction.

pub mod balance;
pub mod entry;

pub use balance::Wallet;
pub use entry::{LedgerEntry, LedgerKind};
