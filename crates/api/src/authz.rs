//! API-side capability gates.
//!
//! Ledger and provisioning operations check capabilities themselves; these
//! gates cover the repository routes that read or edit tenant data directly.

use schoolbank_auth::{EffectiveScope, Permission, Role, authorize_any, require_auth};

use crate::app::errors::ApiError;

pub const READ_STUDENTS: [Permission; 2] = [Permission::VIEW_STUDENTS, Permission::MANAGE_STUDENTS];
pub const READ_CLASSES: [Permission; 2] = [Permission::VIEW_CLASSES, Permission::MANAGE_CLASSES];
pub const READ_CATALOG: [Permission; 3] = [
    Permission::GIVE_REWARDS,
    Permission::MANAGE_REWARDS,
    Permission::MANAGE_SUBJECTS,
];
pub const READ_REQUESTS: [Permission; 2] = [Permission::GIVE_REWARDS, Permission::MANAGE_STUDENTS];
pub const READ_STATS: [Permission; 2] = [Permission::VIEW_REPORTS, Permission::VIEW_STUDENTS];

/// Require any one of `accepted` for the caller's effective role.
pub fn require(scope: &EffectiveScope, accepted: &[Permission]) -> Result<(), ApiError> {
    Ok(authorize_any(scope, accepted)?)
}

/// Require the caller's effective role to be one of `allowed` (superadmin
/// always passes).
pub fn require_roles<'a>(
    scope: &'a EffectiveScope,
    allowed: &[Role],
) -> Result<&'a EffectiveScope, ApiError> {
    Ok(require_auth(Some(scope), allowed)?)
}
