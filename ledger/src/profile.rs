//! User profiles and the role-change audit trail.
//!
//! The profile is the authoritative source of a user's [`Role`]. Tokens only
//! prove identity; what that identity may do is looked up here on every
//! request. Every accepted role change leaves a [`RoleChange`] behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Role;

/// A user's profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// A new student profile. Every first-seen user starts here.
    pub fn student(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            display_name: String::new(),
            role: Role::Student,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Audit record of one accepted role change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    /// Store-wide sequence number.
    pub id: u64,
    pub user_id: Uuid,
    pub old_role: Role,
    pub new_role: Role,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
}
