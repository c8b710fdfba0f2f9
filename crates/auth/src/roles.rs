use core::str::FromStr;

use serde::{Deserialize, Serialize};

use schoolbank_core::DomainError;

/// Role identifier used for RBAC.
///
/// Roles form a fixed hierarchy; a profile's role is immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    SuperAdmin,
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "superadmin",
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    /// Roles this role may provision through the privileged boundary.
    ///
    /// Nobody creates `superadmin` or `student` profiles this way; students are
    /// not login identities.
    pub fn creatable_roles(&self) -> &'static [Role] {
        match self {
            Role::SuperAdmin => &[Role::Admin, Role::Teacher],
            Role::Admin => &[Role::Teacher],
            Role::Teacher | Role::Student => &[],
        }
    }

    pub fn is_staff_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(DomainError::invalid_argument(format!("unknown role '{other}'"))),
        }
    }
}
