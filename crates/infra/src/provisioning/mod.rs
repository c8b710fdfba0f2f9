//! Provisioning Service.
//!
//! Privileged, server-side creation and removal of (identity, profile) pairs.
//! Every operation re-checks the caller's effective role here, whatever the
//! client already checked.
//!
//! Identity creation and the profile write are two stores and cannot commit
//! atomically. When the profile write fails after the identity exists, the
//! identity is left orphaned and logged; [`ProvisioningService::find_orphaned_identities`]
//! lists such identities for an operator.

pub mod identity;

pub use identity::{
    IdentityError, IdentityProvider, InMemoryIdentityProvider, MIN_PASSWORD_LEN, NewIdentity,
};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument, warn};

use schoolbank_auth::{
    EffectiveScope, Identity, Profile, ProfileStatus, Role, can_create, is_valid_email,
    normalize_email,
};
use schoolbank_core::{ClassId, DomainError, DomainResult, Entity, SchoolId, UserId};
use schoolbank_ledger::Class;

use crate::document_store::{CollectionPath, DocumentStore, Fields, Query};
use crate::repository::{ProfileDirectory, SchoolDirectory};

/// Input for provisioning a staff member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStaffMember {
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub school_id: Option<SchoolId>,
    #[serde(default)]
    pub classes: Vec<ClassId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provisioned {
    pub uid: UserId,
    pub profile: Profile,
}

pub struct ProvisioningService<S, P> {
    store: S,
    provider: P,
}

impl<S, P> ProvisioningService<S, P>
where
    S: DocumentStore + Clone,
    P: IdentityProvider,
{
    pub fn new(store: S, provider: P) -> Self {
        Self { store, provider }
    }

    fn profiles(&self) -> ProfileDirectory<S> {
        ProfileDirectory::new(self.store.clone())
    }

    /// Create a login identity and its active profile.
    #[instrument(skip(self, caller, new), fields(caller = %caller.user_id(), role = %new.role), err)]
    pub async fn create_identity_and_profile(
        &self,
        caller: &EffectiveScope,
        new: NewStaffMember,
    ) -> DomainResult<Provisioned> {
        require_provisioner(caller)?;
        let email = validate_member(&new)?;
        if new.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword.into());
        }
        let school_id = self.authorize_target(caller, new.role, new.school_id.as_ref()).await?;
        if self.profiles().find_by_email(&email).await?.is_some() {
            return Err(DomainError::already_exists(format!("a profile already exists for '{email}'")));
        }

        let identity = self
            .provider
            .create_identity(NewIdentity {
                email: email.clone(),
                password: new.password,
                display_name: new.name.trim().to_string(),
            })
            .await?;

        let profile = staff_profile(&identity.id, &email, &new.name, new.role, school_id, new.classes, caller);
        let profile = match self.profiles().create(&profile).await {
            Ok(profile) => profile,
            Err(err) => {
                error!(
                    identity_id = %identity.id,
                    email = %email,
                    error = %err,
                    "profile write failed after identity creation; identity is orphaned"
                );
                return Err(DomainError::internal(format!(
                    "identity {} was created but its profile could not be written: {err}",
                    identity.id
                )));
            }
        };

        info!(uid = %identity.id, school_id = ?profile.school_id, "staff member provisioned");
        Ok(Provisioned {
            uid: identity.id,
            profile,
        })
    }

    /// Pre-create a `pending` profile keyed by a fresh id. The identity that
    /// later signs in with this email links it.
    #[instrument(skip(self, caller, new), fields(caller = %caller.user_id(), role = %new.role), err)]
    pub async fn invite_profile(
        &self,
        caller: &EffectiveScope,
        new: NewStaffMember,
    ) -> DomainResult<Profile> {
        require_provisioner(caller)?;
        let email = validate_member(&new)?;
        let school_id = self.authorize_target(caller, new.role, new.school_id.as_ref()).await?;
        if self.profiles().find_by_email(&email).await?.is_some() {
            return Err(DomainError::already_exists(format!("a profile already exists for '{email}'")));
        }

        let mut profile = staff_profile(
            &UserId::generate(),
            &email,
            &new.name,
            new.role,
            school_id,
            new.classes,
            caller,
        );
        profile.status = ProfileStatus::Pending;
        let profile = self.profiles().create(&profile).await?;
        info!(profile_id = %profile.id, "staff member invited");
        Ok(profile)
    }

    /// Remove a staff member: identity first (tolerating one that is already
    /// gone), then the profile.
    #[instrument(skip(self, caller), fields(caller = %caller.user_id(), target = %user_id), err)]
    pub async fn delete_profile(&self, caller: &EffectiveScope, user_id: &UserId) -> DomainResult<()> {
        require_provisioner(caller)?;
        let target = self.profiles().require(user_id).await?;
        if target.role == Role::SuperAdmin {
            return Err(DomainError::permission_denied("a superadmin cannot be deleted"));
        }
        require_manages(caller, &target)?;

        match self.provider.delete_identity(user_id).await {
            Ok(()) => {}
            Err(IdentityError::NotFound(_)) => {
                info!(user_id = %user_id, "identity already absent");
            }
            Err(err) => return Err(err.into()),
        }
        self.profiles().delete(user_id).await?;
        info!(user_id = %user_id, "staff member removed");
        Ok(())
    }

    /// Replace a teacher's class assignments.
    #[instrument(skip(self, caller, classes), fields(caller = %caller.user_id(), target = %teacher_id), err)]
    pub async fn update_teacher_classes(
        &self,
        caller: &EffectiveScope,
        teacher_id: &UserId,
        classes: Vec<ClassId>,
    ) -> DomainResult<Profile> {
        require_provisioner(caller)?;
        let target = self.profiles().require(teacher_id).await?;
        if target.role != Role::Teacher {
            return Err(DomainError::invalid_argument(format!(
                "only teachers have classes, '{}' is {}",
                target.name, target.role
            )));
        }
        require_manages(caller, &target)?;
        let school_id = target
            .school_id
            .as_ref()
            .ok_or(DomainError::NoTenantContext)?;

        let known: HashSet<String> = self
            .store
            .query(
                &CollectionPath::nested(school_id, Class::COLLECTION),
                &Query::new(),
            )
            .await?
            .iter()
            .map(|doc| doc.id().to_string())
            .collect();
        if let Some(unknown) = classes.iter().find(|c| !known.contains(c.as_str())) {
            return Err(DomainError::invalid_argument(format!("unknown class '{unknown}'")));
        }

        let mut fields = Fields::new();
        fields.insert(
            "classes".to_string(),
            JsonValue::Array(classes.iter().map(|c| JsonValue::from(c.as_str())).collect()),
        );
        self.profiles().update(teacher_id, fields).await
    }

    /// Identities with no profile. Reports only.
    #[instrument(skip(self, caller), fields(caller = %caller.user_id()), err)]
    pub async fn find_orphaned_identities(&self, caller: &EffectiveScope) -> DomainResult<Vec<Identity>> {
        if caller.role() != Role::SuperAdmin {
            return Err(DomainError::permission_denied("reconciliation is superadmin-only"));
        }
        let mut orphans = Vec::new();
        for identity in self.provider.list_identities().await? {
            if self.profiles().get(&identity.id).await?.is_none() {
                orphans.push(identity);
            }
        }
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "identities without a profile");
        }
        Ok(orphans)
    }

    /// Check the role hierarchy and tenant boundary, returning the school the
    /// new profile belongs to.
    async fn authorize_target(
        &self,
        caller: &EffectiveScope,
        role: Role,
        requested: Option<&SchoolId>,
    ) -> DomainResult<SchoolId> {
        match caller.role() {
            Role::SuperAdmin => {
                if !can_create(Role::SuperAdmin, role) {
                    return Err(DomainError::invalid_argument(format!(
                        "role '{role}' cannot be provisioned; use admin or teacher"
                    )));
                }
                let school_id = requested
                    .cloned()
                    .ok_or_else(|| DomainError::invalid_argument("schoolId is required"))?;
                SchoolDirectory::new(self.store.clone()).require(&school_id).await?;
                Ok(school_id)
            }
            Role::Admin => {
                if !can_create(Role::Admin, role) {
                    return Err(DomainError::permission_denied("admins may only create teachers"));
                }
                let own = caller.require_school()?;
                match requested {
                    Some(school_id) if school_id != own => Err(DomainError::permission_denied(
                        "admins may only create users for their own school",
                    )),
                    _ => Ok(own.clone()),
                }
            }
            other => Err(DomainError::permission_denied(format!(
                "role '{other}' may not create users"
            ))),
        }
    }
}

fn require_provisioner(caller: &EffectiveScope) -> DomainResult<()> {
    if caller.role().is_staff_admin() {
        Ok(())
    } else {
        Err(DomainError::permission_denied(format!(
            "role '{}' may not manage users",
            caller.role()
        )))
    }
}

/// Admins manage only the teachers of their own school.
fn require_manages(caller: &EffectiveScope, target: &Profile) -> DomainResult<()> {
    if caller.role() == Role::SuperAdmin {
        return Ok(());
    }
    let own = caller.require_school()?;
    if target.role == Role::Teacher && target.belongs_to(own) {
        Ok(())
    } else {
        Err(DomainError::permission_denied(
            "admins may only manage teachers of their own school",
        ))
    }
}

/// Presence and shape checks that run before any external call. Returns the
/// normalized email.
fn validate_member(new: &NewStaffMember) -> DomainResult<String> {
    let email = normalize_email(&new.email);
    if email.is_empty() || new.name.trim().is_empty() {
        return Err(DomainError::invalid_argument("email, name and role are required"));
    }
    if !is_valid_email(&email) {
        return Err(IdentityError::InvalidEmail(email).into());
    }
    Ok(email)
}

fn staff_profile(
    id: &UserId,
    email: &str,
    name: &str,
    role: Role,
    school_id: SchoolId,
    classes: Vec<ClassId>,
    caller: &EffectiveScope,
) -> Profile {
    let mut profile = Profile::new(id.clone(), email, name.trim(), role, Some(school_id));
    if role == Role::Teacher {
        profile.classes = classes;
    }
    profile.created_by = Some(caller.user_id().clone());
    profile
}

impl<S, P> core::fmt::Debug for ProvisioningService<S, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProvisioningService").finish_non_exhaustive()
    }
}
