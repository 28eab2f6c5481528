//! Ordered schema migrations.
//!
//! Every store records the highest migration version it has applied under
//! the `schema_version` metadata key. On open, each migration with a higher
//! version runs in ascending order and the version is bumped after each one,
//! so a crash mid-way resumes from the first unapplied step. Migrations must
//! be idempotent.

use chrono::Utc;
use tracing::info;

use super::db::{owner_key, LedgerDB};
use crate::error::{LedgerError, LedgerResult};
use crate::quest::Submission;

/// Key holding the RFC 3339 timestamp the store was first laid out.
const META_CREATED_AT: &[u8] = b"created_at";

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u64,
    pub name: &'static str,
    pub apply: fn(&LedgerDB) -> LedgerResult<()>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_layout",
        apply: initial_layout,
    },
    Migration {
        version: 2,
        name: "submission_owner_index",
        apply: submission_owner_index,
    },
];

/// Applies every pending migration. Returns the number applied.
pub(crate) fn run(db: &LedgerDB) -> LedgerResult<usize> {
    let current = db.schema_version()?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        (migration.apply)(db).map_err(|e| LedgerError::Migration {
            version: migration.version,
            name: migration.name,
            reason: e.to_string(),
        })?;
        db.set_schema_version(migration.version)?;
        applied += 1;
        info!(
            version = migration.version,
            name = migration.name,
            "Applied schema migration"
        );
    }

    Ok(applied)
}

/// Stamps the store's creation time. The trees themselves are opened by
/// [`LedgerDB`] before migrations run.
fn initial_layout(db: &LedgerDB) -> LedgerResult<()> {
    let meta = db.metadata();
    if meta.get(META_CREATED_AT)?.is_none() {
        meta.insert(META_CREATED_AT, Utc::now().to_rfc3339().as_bytes())?;
    }
    Ok(())
}

/// Rebuilds the `(quest, user) -> submission` uniqueness index from the
/// submissions tree. When a store holds two submissions for the same pair,
/// the earliest one keeps the slot.
fn submission_owner_index(db: &LedgerDB) -> LedgerResult<()> {
    let mut subs: Vec<Submission> = db
        .submissions_tree()
        .iter()
        .values()
        .map(|v| Ok(bincode::deserialize(&v?)?))
        .collect::<LedgerResult<_>>()?;
    subs.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let index = db.submission_owners_tree();
    for sub in &subs {
        let key = owner_key(sub.quest_id, sub.user_id);
        if index.get(&key)?.is_none() {
            index.insert(key, sub.id.as_bytes().as_slice())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_strictly_ascending() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }

    #[test]
    fn rerun_is_a_no_op() {
        let db = LedgerDB::open_temporary().unwrap();
        assert_eq!(run(&db).unwrap(), 0);
        assert_eq!(db.schema_version().unwrap(), 2);
    }

    #[test]
    fn created_at_is_stamped_once() {
        let db = LedgerDB::open_temporary().unwrap();
        let first = db.metadata().get(META_CREATED_AT).unwrap().unwrap();
        initial_layout(&db).unwrap();
        let second = db.metadata().get(META_CREATED_AT).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn owner_index_rebuilt_from_submissions() {
        let db = LedgerDB::open_temporary().unwrap();
        let quest = uuid::Uuid::new_v4();
        let user = uuid::Uuid::new_v4();
        let sub = Submission::pending_text(uuid::Uuid::new_v4(), quest, user, "e4".into(), Utc::now());

        // Write the submission without its index entry, as an old store would.
        db.submissions_tree()
            .insert(sub.id.as_bytes(), bincode::serialize(&sub).unwrap())
            .unwrap();
        assert_eq!(db.submission_for(quest, user).unwrap(), None);

        submission_owner_index(&db).unwrap();
        assert_eq!(db.submission_for(quest, user).unwrap(), Some(sub.id));
    }

    #[test]
    fn failing_migration_aborts_open_and_keeps_version() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = LedgerDB::open(dir.path()).unwrap();
            db.submissions_tree()
                .insert(uuid::Uuid::new_v4().as_bytes(), &[0xFFu8][..])
                .unwrap();
            db.set_schema_version(1).unwrap();
            db.flush().unwrap();
        }

        let err = LedgerDB::open(dir.path()).unwrap_err();
        match &err {
            LedgerError::Migration { version, name, .. } => {
                assert_eq!(*version, 2);
                assert_eq!(*name, "submission_owner_index");
            }
            other => panic!("expected a migration error, got {other:?}"),
        }
        assert!(err.to_string().starts_with("migration 2 (submission_owner_index) failed"));

        let raw = sled::open(dir.path()).unwrap();
        let version = raw
            .open_tree("metadata")
            .unwrap()
            .get(b"schema_version")
            .unwrap()
            .unwrap();
        assert_eq!(version.as_ref(), &1u64.to_be_bytes()[..]);
    }
}
