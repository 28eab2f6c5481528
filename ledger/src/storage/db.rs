//! # LedgerDB — Persistent Storage Engine
//!
//! The persistence layer for the coin ledger, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree                | Key                          | Value                 |
//! |---------------------|------------------------------|-----------------------|
//! | `wallets`           | `user_id` (16B)              | `bincode(Wallet)`     |
//! | `ledger`            | `user_id` (16B) ‖ `id` (8B BE) | `bincode(LedgerEntry)` |
//! | `quests`            | `quest_id` (16B)             | `bincode(Quest)`      |
//! | `submissions`       | `submission_id` (16B)        | `bincode(Submission)` |
//! | `submission_owners` | `quest_id` ‖ `user_id` (32B) | `submission_id` (16B) |
//! | `profiles`          | `user_id` (16B)              | `bincode(Profile)`    |
//! | `role_audit`        | `id` (8B BE)                 | `bincode(RoleChange)` |
//! | `metadata`          | key (UTF-8)                  | value (bytes)         |
//!
//! Ledger keys put the owner first and the big-endian sequence number
//! second, so a prefix scan over one user's entries comes back in write
//! order and a reversed scan is "newest first" for free.
//!
//! ## Atomicity
//!
//! Writes go through [`LedgerDB::transact`], which opens one sled
//! transaction over every tree. The closure may be re-run on conflict, so
//! it must not have side effects outside the [`Tx`] it is handed.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use sled::{Db, Transactional, Tree};
use uuid::Uuid;

use super::migrations;
use crate::error::{LedgerError, LedgerResult};
use crate::profile::{Profile, RoleChange};
use crate::quest::{Quest, Submission};
use crate::wallet::{LedgerEntry, LedgerKind, Wallet};

/// Result type for code running inside a store transaction.
pub type TxResult<T> = ConflictableTransactionResult<T, LedgerError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Last ledger entry id handed out.
const META_LEDGER_SEQ: &[u8] = b"ledger_seq";

/// Last role-change audit id handed out.
const META_ROLE_AUDIT_SEQ: &[u8] = b"role_audit_seq";

/// Highest migration version applied.
pub(crate) const META_SCHEMA_VERSION: &[u8] = b"schema_version";

// ---------------------------------------------------------------------------
// Codec helpers
// ---------------------------------------------------------------------------

fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn decode_u64(bytes: &[u8]) -> LedgerResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LedgerError::Serialization("invalid u64 bytes".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

fn decode_uuid(bytes: &[u8]) -> LedgerResult<Uuid> {
    Uuid::from_slice(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

pub(crate) fn ledger_key(user_id: Uuid, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub(crate) fn owner_key(quest_id: Uuid, user_id: Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(quest_id.as_bytes());
    key.extend_from_slice(user_id.as_bytes());
    key
}

// ---------------------------------------------------------------------------
// LedgerDB
// ---------------------------------------------------------------------------

/// Persistent storage engine for the coin ledger.
///
/// # Thread Safety
///
/// sled handles are internally synchronized. `LedgerDB` is cheap to clone
/// and can be shared across threads and tasks without external locking;
/// write serialization is the transaction engine's job.
#[derive(Debug, Clone)]
pub struct LedgerDB {
    db: Db,
    wallets: Tree,
    ledger: Tree,
    quests: Tree,
    submissions: Tree,
    submission_owners: Tree,
    profiles: Tree,
    role_audit: Tree,
    metadata: Tree,
}

impl LedgerDB {
    /// Open or create a database at the given path and bring its schema up
    /// to date.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    ///
    /// Ideal for tests: no filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> LedgerResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> LedgerResult<Self> {
        let store = Self {
            wallets: db.open_tree("wallets")?,
            ledger: db.open_tree("ledger")?,
            quests: db.open_tree("quests")?,
            submissions: db.open_tree("submissions")?,
            submission_owners: db.open_tree("submission_owners")?,
            profiles: db.open_tree("profiles")?,
            role_audit: db.open_tree("role_audit")?,
            metadata: db.open_tree("metadata")?,
            db,
        };
        migrations::run(&store)?;
        Ok(store)
    }

    /// Runs `f` inside one serializable transaction spanning every tree.
    ///
    /// Returning `Err` from the closure aborts the transaction with no
    /// effect. sled may call the closure more than once on conflict.
    pub fn transact<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: Fn(&Tx<'_>) -> TxResult<T>,
    {
        let result = (
            &self.wallets,
            &self.ledger,
            &self.quests,
            &self.submissions,
            &self.submission_owners,
            &self.profiles,
            &self.role_audit,
            &self.metadata,
        )
            .transaction(
                |(wallets, ledger, quests, submissions, submission_owners, profiles, role_audit, metadata)| {
                    f(&Tx {
                        wallets,
                        ledger,
                        quests,
                        submissions,
                        submission_owners,
                        profiles,
                        role_audit,
                        metadata,
                    })
                },
            );
        result.map_err(LedgerError::from)
    }

    // -- Wallet & ledger reads ----------------------------------------------

    /// Returns a user's wallet, if one has been created.
    pub fn get_wallet(&self, user_id: Uuid) -> LedgerResult<Option<Wallet>> {
        match self.wallets.get(user_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every wallet in the store, in key order.
    pub fn all_wallets(&self) -> LedgerResult<Vec<Wallet>> {
        self.wallets
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect()
    }

    /// One page of a user's ledger entries, newest first.
    pub fn ledger_page(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        self.ledger
            .scan_prefix(user_id.as_bytes())
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .map(|v| decode(&v?))
            .collect()
    }

    /// All of a user's ledger entries, oldest first.
    pub fn ledger_entries(&self, user_id: Uuid) -> LedgerResult<Vec<LedgerEntry>> {
        self.ledger
            .scan_prefix(user_id.as_bytes())
            .values()
            .map(|v| decode(&v?))
            .collect()
    }

    /// Every ledger entry in the store, grouped by user.
    pub fn all_entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        self.ledger
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect()
    }

    // -- Quest & submission reads -------------------------------------------

    pub fn get_quest(&self, quest_id: Uuid) -> LedgerResult<Option<Quest>> {
        match self.quests.get(quest_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every quest, newest first.
    pub fn all_quests(&self) -> LedgerResult<Vec<Quest>> {
        let mut quests: Vec<Quest> = self
            .quests
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect::<LedgerResult<_>>()?;
        quests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quests)
    }

    pub fn get_submission(&self, submission_id: Uuid) -> LedgerResult<Option<Submission>> {
        match self.submissions.get(submission_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every submission, newest first.
    pub fn all_submissions(&self) -> LedgerResult<Vec<Submission>> {
        let mut subs: Vec<Submission> = self
            .submissions
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect::<LedgerResult<_>>()?;
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs)
    }

    /// Looks up the submission a user made for a quest, via the uniqueness
    /// index.
    pub fn submission_for(&self, quest_id: Uuid, user_id: Uuid) -> LedgerResult<Option<Uuid>> {
        match self.submission_owners.get(owner_key(quest_id, user_id))? {
            Some(bytes) => Ok(Some(decode_uuid(&bytes)?)),
            None => Ok(None),
        }
    }

    // -- Profiles -----------------------------------------------------------

    pub fn get_profile(&self, user_id: Uuid) -> LedgerResult<Option<Profile>> {
        match self.profiles.get(user_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The role-change audit log, oldest first.
    pub fn role_changes(&self) -> LedgerResult<Vec<RoleChange>> {
        self.role_audit
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect()
    }

    // -- Metadata -----------------------------------------------------------

    /// The highest migration version applied, or 0 for a fresh store.
    pub fn schema_version(&self) -> LedgerResult<u64> {
        match self.metadata.get(META_SCHEMA_VERSION)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    pub(crate) fn set_schema_version(&self, version: u64) -> LedgerResult<()> {
        self.metadata
            .insert(META_SCHEMA_VERSION, &version.to_be_bytes()[..])?;
        Ok(())
    }

    pub(crate) fn metadata(&self) -> &Tree {
        &self.metadata
    }

    pub(crate) fn submissions_tree(&self) -> &Tree {
        &self.submissions
    }

    pub(crate) fn submission_owners_tree(&self) -> &Tree {
        &self.submission_owners
    }

    // -- Utility ------------------------------------------------------------

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    pub fn entry_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn quest_count(&self) -> usize {
        self.quests.len()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transactional view
// ---------------------------------------------------------------------------

/// Typed access to every tree inside one transaction.
pub struct Tx<'a> {
    wallets: &'a TransactionalTree,
    ledger: &'a TransactionalTree,
    quests: &'a TransactionalTree,
    submissions: &'a TransactionalTree,
    submission_owners: &'a TransactionalTree,
    profiles: &'a TransactionalTree,
    role_audit: &'a TransactionalTree,
    metadata: &'a TransactionalTree,
}

impl Tx<'_> {
    fn next_seq(&self, key: &[u8]) -> TxResult<u64> {
        let current = match self.metadata.get(key)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 0,
        };
        let next = current + 1;
        self.metadata.insert(key, &next.to_be_bytes()[..])?;
        Ok(next)
    }

    // -- Wallets & ledger ---------------------------------------------------

    pub fn wallet(&self, user_id: Uuid) -> TxResult<Option<Wallet>> {
        match self.wallets.get(user_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the user's wallet, creating a zero-balance one if missing.
    pub fn wallet_or_create(&self, user_id: Uuid, now: DateTime<Utc>) -> TxResult<Wallet> {
        match self.wallet(user_id)? {
            Some(wallet) => Ok(wallet),
            None => {
                let wallet = Wallet::new(user_id, now);
                self.put_wallet(&wallet)?;
                Ok(wallet)
            }
        }
    }

    pub(crate) fn put_wallet(&self, wallet: &Wallet) -> TxResult<()> {
        self.wallets
            .insert(&wallet.user_id.as_bytes()[..], encode(wallet)?)?;
        Ok(())
    }

    /// Moves coins: appends one ledger entry and applies the same delta to
    /// the owner's wallet. This is the only write path for balances.
    ///
    /// Aborts with [`LedgerError::InsufficientBalance`] or
    /// [`LedgerError::BalanceOverflow`] if the wallet cannot absorb `delta`.
    #[allow(clippy::too_many_arguments)]
    pub fn post(
        &self,
        user_id: Uuid,
        delta: i64,
        kind: LedgerKind,
        quest_id: Option<Uuid>,
        created_by: Uuid,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> TxResult<(LedgerEntry, Wallet)> {
        let mut wallet = self.wallet_or_create(user_id, now)?;
        wallet.apply_delta(delta, now)?;

        let entry = LedgerEntry {
            id: self.next_seq(META_LEDGER_SEQ)?,
            user_id,
            delta,
            kind,
            quest_id,
            created_by,
            created_at: now,
            note,
        };
        self.ledger
            .insert(ledger_key(user_id, entry.id), encode(&entry)?)?;
        self.put_wallet(&wallet)?;
        Ok((entry, wallet))
    }

    // -- Quests & submissions -----------------------------------------------

    pub fn quest(&self, quest_id: Uuid) -> TxResult<Option<Quest>> {
        match self.quests.get(quest_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`Tx::quest`] but aborts with [`LedgerError::QuestNotFound`].
    pub fn require_quest(&self, quest_id: Uuid) -> TxResult<Quest> {
        Ok(self
            .quest(quest_id)?
            .ok_or(LedgerError::QuestNotFound(quest_id))?)
    }

    pub fn put_quest(&self, quest: &Quest) -> TxResult<()> {
        self.quests.insert(&quest.id.as_bytes()[..], encode(quest)?)?;
        Ok(())
    }

    pub fn submission(&self, submission_id: Uuid) -> TxResult<Option<Submission>> {
        match self.submissions.get(submission_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stores a submission, updating an existing one in place.
    pub fn put_submission(&self, submission: &Submission) -> TxResult<()> {
        self.submissions
            .insert(&submission.id.as_bytes()[..], encode(submission)?)?;
        Ok(())
    }

    /// Stores a brand-new submission and claims its `(quest, user)` slot.
    ///
    /// Aborts with [`LedgerError::AlreadySubmitted`] if the user already has
    /// a submission for the quest.
    pub fn insert_submission(&self, submission: &Submission) -> TxResult<()> {
        let key = owner_key(submission.quest_id, submission.user_id);
        if self.submission_owners.get(&key)?.is_some() {
            return Err(LedgerError::AlreadySubmitted(submission.quest_id).into());
        }
        self.submission_owners
            .insert(key, &submission.id.as_bytes()[..])?;
        self.put_submission(submission)
    }

    // -- Profiles -----------------------------------------------------------

    pub fn profile(&self, user_id: Uuid) -> TxResult<Option<Profile>> {
        match self.profiles.get(user_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_profile(&self, profile: &Profile) -> TxResult<()> {
        self.profiles
            .insert(&profile.user_id.as_bytes()[..], encode(profile)?)?;
        Ok(())
    }

    /// Appends a role-change audit record and returns it.
    pub fn append_role_change(
        &self,
        user_id: Uuid,
        old_role: crate::role::Role,
        new_role: crate::role::Role,
        changed_by: Uuid,
        now: DateTime<Utc>,
    ) -> TxResult<RoleChange> {
        let change = RoleChange {
            id: self.next_seq(META_ROLE_AUDIT_SEQ)?,
            user_id,
            old_role,
            new_role,
            changed_by,
            changed_at: now,
        };
        self.role_audit
            .insert(&change.id.to_be_bytes()[..], encode(&change)?)?;
        Ok(change)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::{QuestConfig, QuestStatus};
    use crate::role::Role;

    fn seed_entries(db: &LedgerDB, user: Uuid, deltas: &[i64]) {
        for delta in deltas {
            db.transact(|tx| {
                tx.post(
                    user,
                    *delta,
                    LedgerKind::AdminGrant,
                    None,
                    user,
                    None,
                    Utc::now(),
                )
                .map(|_| ())
            })
            .unwrap();
        }
    }

    fn sample_quest() -> Quest {
        let now = Utc::now();
        Quest {
            id: Uuid::new_v4(),
            title: "Fork Tactics".into(),
            description: String::new(),
            reward_coins: 20,
            status: QuestStatus::Submitted,
            attribute_id: None,
            config: QuestConfig::Text {
                prompt: "Find the fork".into(),
                rubric: None,
            },
            active: true,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn open_temporary_database_is_migrated() {
        let db = LedgerDB::open_temporary().expect("temp db");
        assert_eq!(db.wallet_count(), 0);
        assert_eq!(
            db.schema_version().unwrap(),
            migrations::MIGRATIONS.last().unwrap().version
        );
    }

    #[test]
    fn reopen_persistent_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let user = Uuid::new_v4();
        {
            let db = LedgerDB::open(dir.path()).expect("open");
            seed_entries(&db, user, &[40]);
            db.flush().unwrap();
        }
        let db = LedgerDB::open(dir.path()).expect("reopen");
        assert_eq!(db.get_wallet(user).unwrap().unwrap().balance, 40);
        assert_eq!(db.ledger_entries(user).unwrap().len(), 1);
    }

    #[test]
    fn post_keeps_wallet_and_ledger_in_step() {
        let db = LedgerDB::open_temporary().unwrap();
        let user = Uuid::new_v4();
        seed_entries(&db, user, &[50, -20, 5]);

        let wallet = db.get_wallet(user).unwrap().unwrap();
        let sum: i64 = db.ledger_entries(user).unwrap().iter().map(|e| e.delta).sum();
        assert_eq!(wallet.balance, 35);
        assert_eq!(sum, 35);
    }

    #[test]
    fn failed_post_leaves_no_trace() {
        let db = LedgerDB::open_temporary().unwrap();
        let user = Uuid::new_v4();
        seed_entries(&db, user, &[15]);

        let result = db.transact(|tx| {
            tx.post(
                user,
                -20,
                LedgerKind::QuestBudget,
                None,
                user,
                None,
                Utc::now(),
            )
            .map(|_| ())
        });

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { need: 20, .. })
        ));
        assert_eq!(db.get_wallet(user).unwrap().unwrap().balance, 15);
        assert_eq!(db.ledger_entries(user).unwrap().len(), 1);
    }

    #[test]
    fn entry_ids_increase_across_users() {
        let db = LedgerDB::open_temporary().unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        seed_entries(&db, alice, &[1]);
        seed_entries(&db, bob, &[1]);
        seed_entries(&db, alice, &[1]);

        let ids: Vec<u64> = db.ledger_entries(alice).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(db.ledger_entries(bob).unwrap()[0].id, 2);
    }

    #[test]
    fn ledger_page_is_newest_first() {
        let db = LedgerDB::open_temporary().unwrap();
        let user = Uuid::new_v4();
        seed_entries(&db, user, &[1, 2, 3, 4, 5]);

        let page = db.ledger_page(user, 2, 0).unwrap();
        assert_eq!(page.iter().map(|e| e.delta).collect::<Vec<_>>(), vec![5, 4]);

        let page = db.ledger_page(user, 2, 2).unwrap();
        assert_eq!(page.iter().map(|e| e.delta).collect::<Vec<_>>(), vec![3, 2]);

        let page = db.ledger_page(user, 10, 4).unwrap();
        assert_eq!(page.len(), 1);

        assert!(db.ledger_page(user, 10, 10).unwrap().is_empty());
    }

    #[test]
    fn ledger_page_does_not_leak_other_users() {
        let db = LedgerDB::open_temporary().unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        seed_entries(&db, alice, &[10]);
        seed_entries(&db, bob, &[99]);

        let page = db.ledger_page(alice, 50, 0).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].user_id, alice);
    }

    #[test]
    fn quest_round_trip() {
        let db = LedgerDB::open_temporary().unwrap();
        let quest = sample_quest();
        db.transact(|tx| tx.put_quest(&quest)).unwrap();

        let stored = db.get_quest(quest.id).unwrap().unwrap();
        assert_eq!(stored, quest);
        assert!(db.get_quest(Uuid::new_v4()).unwrap().is_none());
        assert_eq!(db.quest_count(), 1);
    }

    #[test]
    fn insert_submission_enforces_one_per_quest() {
        let db = LedgerDB::open_temporary().unwrap();
        let quest = Uuid::new_v4();
        let user = Uuid::new_v4();
        let first = Submission::pending_text(Uuid::new_v4(), quest, user, "a".into(), Utc::now());
        let second = Submission::pending_text(Uuid::new_v4(), quest, user, "b".into(), Utc::now());

        db.transact(|tx| tx.insert_submission(&first)).unwrap();
        let err = db.transact(|tx| tx.insert_submission(&second)).unwrap_err();

        assert!(matches!(err, LedgerError::AlreadySubmitted(q) if q == quest));
        assert_eq!(db.submission_count(), 1);
        assert_eq!(db.submission_for(quest, user).unwrap(), Some(first.id));
    }

    #[test]
    fn role_changes_are_sequenced() {
        let db = LedgerDB::open_temporary().unwrap();
        let user = Uuid::new_v4();
        let admin = Uuid::new_v4();

        db.transact(|tx| {
            tx.append_role_change(user, Role::Student, Role::Staff, admin, Utc::now())?;
            tx.append_role_change(user, Role::Staff, Role::OrgAdmin, admin, Utc::now())?;
            Ok(())
        })
        .unwrap();

        let log = db.role_changes().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, 1);
        assert_eq!(log[1].new_role, Role::OrgAdmin);
    }
}
