//! Capability Authorizer.
//!
//! Pure functions over the *effective* role: no IO, no panics, no business
//! logic. The HTTP layer and the engine both call into this; a client-side copy
//! of these checks is a UX convenience and never a security boundary.

use thiserror::Error;

use schoolbank_core::DomainError;

use crate::permissions::role_permissions;
use crate::{EffectiveScope, Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthenticated => DomainError::Unauthenticated,
            AuthzError::Forbidden(msg) => DomainError::PermissionDenied(msg),
        }
    }
}

/// Whether `role` holds `required` (superadmin implicitly holds everything).
pub fn has_permission(role: Role, required: &Permission) -> bool {
    role_permissions(role)
        .iter()
        .any(|p| p.is_wildcard() || p == required)
}

/// `can(effectiveRole, action, resource)`.
///
/// An unresolved role can do nothing.
pub fn can(role: Option<Role>, action: &str, resource: &str) -> bool {
    match role {
        Some(role) => has_permission(role, &Permission::of(action, resource)),
        None => false,
    }
}

/// Authorize the effective scope for one permission.
pub fn authorize(scope: &EffectiveScope, required: &Permission) -> Result<(), AuthzError> {
    if has_permission(scope.role(), required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(format!(
            "role '{}' lacks '{}'",
            scope.role(),
            required
        )))
    }
}

/// Authorize the effective scope for any one of several permissions.
pub fn authorize_any(scope: &EffectiveScope, accepted: &[Permission]) -> Result<(), AuthzError> {
    if accepted.iter().any(|p| has_permission(scope.role(), p)) {
        return Ok(());
    }
    let names = accepted
        .iter()
        .map(Permission::as_str)
        .collect::<Vec<_>>()
        .join(" | ");
    Err(AuthzError::Forbidden(format!(
        "role '{}' lacks any of [{}]",
        scope.role(),
        names
    )))
}

/// Gate on a resolved identity whose effective role is one of `allowed`.
///
/// An empty `allowed` list admits any resolved identity. Superadmin always
/// passes, impersonation notwithstanding.
pub fn require_auth<'a>(
    scope: Option<&'a EffectiveScope>,
    allowed: &[Role],
) -> Result<&'a EffectiveScope, AuthzError> {
    let scope = scope.ok_or(AuthzError::Unauthenticated)?;
    if allowed.is_empty() {
        return Ok(scope);
    }
    let role = scope.role();
    if allowed.contains(&role) || role == Role::SuperAdmin {
        Ok(scope)
    } else {
        Err(AuthzError::Forbidden(format!("role '{role}' may not access this area")))
    }
}

/// Role-creation hierarchy used by provisioning.
pub fn can_create(creator: Role, target: Role) -> bool {
    creator.creatable_roles().contains(&target)
}
