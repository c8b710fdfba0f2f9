use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Permission identifier.
///
/// Permissions are `action:resource` pairs (e.g. `"give:rewards"`).
/// The wildcard permission `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");
    pub const MANAGE_TEACHERS: Permission = Permission::from_static("manage:teachers");
    pub const MANAGE_STUDENTS: Permission = Permission::from_static("manage:students");
    pub const MANAGE_CLASSES: Permission = Permission::from_static("manage:classes");
    pub const MANAGE_REWARDS: Permission = Permission::from_static("manage:rewards");
    pub const MANAGE_SUBJECTS: Permission = Permission::from_static("manage:subjects");
    pub const MANAGE_SETTINGS: Permission = Permission::from_static("manage:settings");
    pub const VIEW_TRANSACTIONS: Permission = Permission::from_static("view:transactions");
    pub const VIEW_REPORTS: Permission = Permission::from_static("view:reports");
    pub const GIVE_REWARDS: Permission = Permission::from_static("give:rewards");
    pub const VIEW_STUDENTS: Permission = Permission::from_static("view:students");
    pub const VIEW_CLASSES: Permission = Permission::from_static("view:classes");
    pub const VIEW_SELF: Permission = Permission::from_static("view:self");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Build the permission for an `action` on a `resource`.
    pub fn of(action: &str, resource: &str) -> Self {
        Self(Cow::Owned(format!("{action}:{resource}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role → permission mapping.
pub fn role_permissions(role: Role) -> &'static [Permission] {
    const SUPERADMIN: &[Permission] = &[Permission::WILDCARD];
    const ADMIN: &[Permission] = &[
        Permission::MANAGE_TEACHERS,
        Permission::MANAGE_STUDENTS,
        Permission::MANAGE_CLASSES,
        Permission::MANAGE_REWARDS,
        Permission::MANAGE_SUBJECTS,
        Permission::VIEW_TRANSACTIONS,
        Permission::VIEW_REPORTS,
        Permission::MANAGE_SETTINGS,
    ];
    const TEACHER: &[Permission] = &[
        Permission::GIVE_REWARDS,
        Permission::VIEW_STUDENTS,
        Permission::VIEW_CLASSES,
        Permission::VIEW_TRANSACTIONS,
    ];
    const STUDENT: &[Permission] = &[Permission::VIEW_SELF];

    match role {
        Role::SuperAdmin => SUPERADMIN,
        Role::Admin => ADMIN,
        Role::Teacher => TEACHER,
        Role::Student => STUDENT,
    }
}
