//! Tenant Scope Resolver.
//!
//! Turns an authenticated identity into the [`EffectiveScope`] every other
//! component works under. The scope is re-derived from the profile store on
//! each call; nothing the client claims about its role or school is trusted
//! beyond which school a superadmin asks to impersonate.

use chrono::Utc;
use tracing::{info, instrument, warn};

use schoolbank_auth::{
    EffectiveScope, Identity, ImpersonationContext, Profile, ProfileStatus, Role,
};
use schoolbank_core::{DomainError, DomainResult, Entity, SchoolId};
use schoolbank_ledger::School;

use crate::document_store::{DocumentStore, WriteBatch, WriteOp, encode};
use crate::repository::directory::profile_path;
use crate::repository::{ProfileDirectory, SchoolDirectory};

#[derive(Debug, Clone)]
pub struct ScopeResolver<S> {
    profiles: ProfileDirectory<S>,
    schools: SchoolDirectory<S>,
    store: S,
}

impl<S> ScopeResolver<S>
where
    S: DocumentStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self {
            profiles: ProfileDirectory::new(store.clone()),
            schools: SchoolDirectory::new(store.clone()),
            store,
        }
    }

    /// Resolve `identity`, honouring an impersonation request from a
    /// superadmin.
    ///
    /// Fails with `NotFound(Profile)` when neither the identity id nor its
    /// email leads to a profile, and with `PermissionDenied` when the
    /// effective school is quarantined.
    #[instrument(skip(self, identity), fields(user_id = %identity.id), err)]
    pub async fn resolve(
        &self,
        identity: &Identity,
        impersonate: Option<&SchoolId>,
    ) -> DomainResult<EffectiveScope> {
        let profile = self.load_profile(identity).await?;

        let impersonation = match impersonate {
            Some(school_id) if profile.role == Role::SuperAdmin => {
                Some(self.impersonation_for(profile.role, school_id).await?)
            }
            Some(school_id) => {
                warn!(
                    user_id = %identity.id,
                    role = %profile.role,
                    school_id = %school_id,
                    "ignoring impersonation request from non-superadmin"
                );
                None
            }
            None => None,
        };

        let scope = EffectiveScope::derive(identity.clone(), &profile, impersonation);
        if !scope.is_impersonating() {
            if let Some(school_id) = scope.school_id() {
                self.ensure_open(school_id).await?;
            }
        }
        Ok(scope)
    }

    /// Validate and build an impersonation of `school_id` for a caller whose
    /// real role is `real_role`.
    pub async fn impersonation_for(
        &self,
        real_role: Role,
        school_id: &SchoolId,
    ) -> DomainResult<ImpersonationContext> {
        if real_role != Role::SuperAdmin {
            return Err(DomainError::permission_denied(
                "only superadmins may impersonate a school",
            ));
        }
        let school = self.ensure_open(school_id).await?;
        Ok(ImpersonationContext::start(
            real_role,
            school.id,
            school.config.name,
            Utc::now(),
        )?)
    }

    async fn ensure_open(&self, school_id: &SchoolId) -> DomainResult<School> {
        let school = self.schools.require(school_id).await?;
        if school.is_quarantined() {
            return Err(DomainError::permission_denied(format!(
                "school {school_id} is being deleted"
            )));
        }
        Ok(school)
    }

    async fn load_profile(&self, identity: &Identity) -> DomainResult<Profile> {
        if let Some(profile) = self.profiles.get(&identity.id).await? {
            return Ok(profile);
        }
        match self.profiles.find_by_email(&identity.email).await? {
            Some(placeholder) => self.link(identity, placeholder).await,
            None => Err(DomainError::NotFound(Profile::KIND)),
        }
    }

    /// Re-key a placeholder profile under the identity id that just logged in.
    ///
    /// Both documents live in the `users` partition, so the new profile and
    /// the placeholder's removal commit together.
    async fn link(&self, identity: &Identity, placeholder: Profile) -> DomainResult<Profile> {
        let old_id = placeholder.id.clone();
        let linked = Profile {
            id: identity.id.clone(),
            status: ProfileStatus::Active,
            ..placeholder
        };

        let mut fields = encode(&linked)?;
        fields.remove("linkedAt");
        let batch = WriteBatch::new()
            .with(WriteOp::create(profile_path(&linked.id), fields.clone()).stamped("linkedAt"))
            .with(WriteOp::delete(profile_path(&old_id)));
        let result = self.store.commit(batch).await?;

        info!(
            user_id = %linked.id,
            placeholder_id = %old_id,
            "linked pre-created profile on first login"
        );
        Ok(Profile {
            linked_at: Some(result.commit_time),
            ..linked
        })
    }
}
