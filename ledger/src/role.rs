//! # Roles & Principals
//!
//! The platform has exactly four roles, and they form a strict hierarchy:
//! a master admin can do anything an org admin can, an org admin anything
//! staff can, and so on down to students. The ordering is the derive order
//! of [`Role`], so authorization checks are a single comparison.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's role, ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Takes quests and earns coins.
    #[default]
    Student,
    /// Authors quests and reviews text submissions.
    Staff,
    /// Manages an organization's staff and quests.
    OrgAdmin,
    /// Approves quests, grants coins, and changes roles.
    MasterAdmin,
}

impl Role {
    /// All roles, least privileged first.
    pub const ALL: [Role; 4] = [Role::Student, Role::Staff, Role::OrgAdmin, Role::MasterAdmin];

    /// Returns `true` if this role is at or above `required` in the hierarchy.
    pub fn at_least(self, required: Role) -> bool {
        self >= required
    }

    /// The wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::OrgAdmin => "org_admin",
            Role::MasterAdmin => "master_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "staff" => Ok(Role::Staff),
            "org_admin" => Ok(Role::OrgAdmin),
            "master_admin" => Ok(Role::MasterAdmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The authenticated caller of a procedure.
///
/// The user id always comes from the verified token and the role from the
/// profile store. Procedures never take a user id parameter for "my" data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Returns `true` if the caller's role is at or above `required`.
    pub fn can(&self, required: Role) -> bool {
        self.role.at_least(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_role_is_student() {
        assert_eq!(Role::default(), Role::Student);
    }

    #[test]
    fn hierarchy_is_ordered() {
        assert!(Role::MasterAdmin > Role::OrgAdmin);
        assert!(Role::OrgAdmin > Role::Staff);
        assert!(Role::Staff > Role::Student);
    }

    #[test]
    fn at_least_is_inclusive() {
        assert!(Role::Staff.at_least(Role::Staff));
        assert!(Role::MasterAdmin.at_least(Role::Student));
        assert!(!Role::Student.at_least(Role::Staff));
        assert!(!Role::OrgAdmin.at_least(Role::MasterAdmin));
    }

    #[test]
    fn parse_and_display_agree() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert_eq!(" Master_Admin ".parse::<Role>().unwrap(), Role::MasterAdmin);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Role::OrgAdmin).unwrap();
        assert_eq!(json, "\"org_admin\"");
        let back: Role = serde_json::from_str("\"master_admin\"").unwrap();
        assert_eq!(back, Role::MasterAdmin);
    }

    #[test]
    fn principal_can_checks_hierarchy() {
        let staff = Principal::new(Uuid::new_v4(), Role::Staff);
        assert!(staff.can(Role::Student));
        assert!(staff.can(Role::Staff));
        assert!(!staff.can(Role::MasterAdmin));
    }
}
