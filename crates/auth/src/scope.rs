//! Effective scope: the role and tenant in force for one caller.
//!
//! Built from a resolved profile plus an optional impersonation override. Every
//! downstream authorization and scoping decision reads the *effective* values;
//! the real role is kept only for starting and leaving impersonation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use schoolbank_core::{DomainError, DomainResult, SchoolId, UserId};

use crate::{AuthzError, Identity, Profile, Role};

/// A superadmin acting as the admin of one school.
///
/// Held by the caller's session only; never persisted server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationContext {
    pub school_id: SchoolId,
    pub school_name: String,
    pub role: Role,
    pub started_at: DateTime<Utc>,
}

impl ImpersonationContext {
    /// Start impersonating `school_id`; only a real superadmin may.
    pub fn start(
        real_role: Role,
        school_id: SchoolId,
        school_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, AuthzError> {
        if real_role != Role::SuperAdmin {
            return Err(AuthzError::Forbidden(
                "only superadmins may impersonate a school".to_string(),
            ));
        }
        Ok(Self {
            school_id,
            school_name: school_name.into(),
            role: Role::Admin,
            started_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveScope {
    identity: Identity,
    name: String,
    real_role: Role,
    role: Role,
    school_id: Option<SchoolId>,
    impersonation: Option<ImpersonationContext>,
}

impl EffectiveScope {
    /// Apply an optional impersonation override to a resolved profile.
    ///
    /// The override only takes effect for superadmins; anyone else keeps their
    /// own role and school.
    pub fn derive(
        identity: Identity,
        profile: &Profile,
        impersonation: Option<ImpersonationContext>,
    ) -> Self {
        let impersonation = match impersonation {
            Some(ctx) if profile.role == Role::SuperAdmin => Some(ctx),
            Some(ctx) => {
                warn!(
                    user_id = %identity.id,
                    role = %profile.role,
                    school_id = %ctx.school_id,
                    "ignoring impersonation request from non-superadmin"
                );
                None
            }
            None => None,
        };

        let (role, school_id) = match &impersonation {
            Some(ctx) => (ctx.role, Some(ctx.school_id.clone())),
            None => (profile.role, profile.school_id.clone()),
        };

        Self {
            identity,
            name: profile.name.clone(),
            real_role: profile.role,
            role,
            school_id,
            impersonation,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> &UserId {
        &self.identity.id
    }

    pub fn display_name(&self) -> &str {
        &self.name
    }

    /// Effective role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Role of the underlying profile, ignoring impersonation.
    pub fn real_role(&self) -> Role {
        self.real_role
    }

    /// Effective school, if any.
    pub fn school_id(&self) -> Option<&SchoolId> {
        self.school_id.as_ref()
    }

    pub fn require_school(&self) -> DomainResult<&SchoolId> {
        self.school_id.as_ref().ok_or(DomainError::NoTenantContext)
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonation.is_some()
    }

    pub fn impersonation(&self) -> Option<&ImpersonationContext> {
        self.impersonation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn superadmin() -> (Identity, Profile) {
        let identity = Identity::new(UserId::new("root"), "root@example.org");
        let profile = Profile::new(identity.id.clone(), &identity.email, "Root", Role::SuperAdmin, None);
        (identity, profile)
    }

    #[test]
    fn superadmin_without_override_has_no_school() {
        let (identity, profile) = superadmin();
        let scope = EffectiveScope::derive(identity, &profile, None);
        assert_eq!(scope.role(), Role::SuperAdmin);
        assert_eq!(scope.require_school(), Err(DomainError::NoTenantContext));
    }

    #[test]
    fn impersonation_swaps_effective_scope_and_keeps_real_role() {
        let (identity, profile) = superadmin();
        let ctx = ImpersonationContext::start(Role::SuperAdmin, SchoolId::new("a"), "A", Utc::now()).unwrap();
        let scope = EffectiveScope::derive(identity, &profile, Some(ctx));
        assert!(scope.is_impersonating());
        assert_eq!(scope.role(), Role::Admin);
        assert_eq!(scope.real_role(), Role::SuperAdmin);
        assert_eq!(scope.require_school().unwrap().as_str(), "a");
    }

    #[test]
    fn override_is_ignored_for_non_superadmins() {
        let identity = Identity::new(UserId::new("t"), "t@example.org");
        let profile = Profile::new(identity.id.clone(), &identity.email, "T", Role::Teacher, Some(SchoolId::new("own")));
        let ctx = ImpersonationContext {
            school_id: SchoolId::new("other"),
            school_name: "Other".to_string(),
            role: Role::Admin,
            started_at: Utc::now(),
        };
        let scope = EffectiveScope::derive(identity, &profile, Some(ctx));
        assert!(!scope.is_impersonating());
        assert_eq!(scope.role(), Role::Teacher);
        assert_eq!(scope.school_id().unwrap().as_str(), "own");
    }

    #[test]
    fn only_superadmins_start_impersonation() {
        for role in [Role::Admin, Role::Teacher, Role::Student] {
            assert!(ImpersonationContext::start(role, SchoolId::new("a"), "A", Utc::now()).is_err());
        }
    }
}
