//! The role-change guard.
//!
//! Only a master admin may change anyone's role, and every change that
//! actually changes something is written to the audit log in the same
//! transaction as the profile update.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{require, LedgerService};
use crate::error::LedgerResult;
use crate::profile::{Profile, RoleChange};
use crate::role::{Principal, Role};

impl LedgerService {
    /// Sets `user_id`'s role. Returns the audit record, or `None` when the
    /// user already had `new_role`.
    pub fn set_user_role(
        &self,
        caller: &Principal,
        user_id: Uuid,
        new_role: Role,
    ) -> LedgerResult<Option<RoleChange>> {
        require(caller, Role::MasterAdmin, "change roles")?;
        self.apply_role(user_id, new_role, caller.user_id, None)
    }

    /// Seeds the first master admin of a fresh store. Used by node
    /// initialization, where there is no caller yet to authorize it. The
    /// display name and the promotion commit together.
    pub fn bootstrap_master_admin(
        &self,
        user_id: Uuid,
        display_name: &str,
    ) -> LedgerResult<Option<RoleChange>> {
        self.apply_role(user_id, Role::MasterAdmin, user_id, Some(display_name.trim()))
    }

    /// The full role-change audit log, oldest first.
    pub fn role_changes(&self, caller: &Principal) -> LedgerResult<Vec<RoleChange>> {
        require(caller, Role::MasterAdmin, "read the role audit log")?;
        self.db.role_changes()
    }

    fn apply_role(
        &self,
        user_id: Uuid,
        new_role: Role,
        changed_by: Uuid,
        display_name: Option<&str>,
    ) -> LedgerResult<Option<RoleChange>> {
        let now = Utc::now();
        let change = self.db.transact(|tx| {
            let mut profile = tx
                .profile(user_id)?
                .unwrap_or_else(|| Profile::student(user_id, now));
            if let Some(name) = display_name.filter(|n| *n != profile.display_name) {
                profile.display_name = name.to_string();
                profile.updated_at = now;
            }
            if profile.role == new_role {
                tx.put_profile(&profile)?;
                return Ok(None);
            }

            let old_role = profile.role;
            profile.role = new_role;
            profile.updated_at = now;
            tx.put_profile(&profile)?;
            let change = tx.append_role_change(user_id, old_role, new_role, changed_by, now)?;
            Ok(Some(change))
        })?;

        if let Some(c) = &change {
            info!(
                user = %user_id,
                from = %c.old_role,
                to = %c.new_role,
                by = %changed_by,
                "Role changed"
            );
        }
        Ok(change)
    }
}
