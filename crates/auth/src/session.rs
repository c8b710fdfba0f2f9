//! Client-held session state.
//!
//! The only place an [`ImpersonationContext`] lives. It is persisted in a
//! client-local key/value store under a fixed key so it survives page reloads,
//! and it is wiped on logout and on explicit exit. Nothing here is trusted by
//! the server: requests carry the impersonated school id and the server
//! re-derives the effective scope from the profile store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use schoolbank_core::SchoolId;

use crate::{AuthzError, EffectiveScope, Identity, ImpersonationContext, Profile, Role};

/// Local-storage key holding the serialized impersonation context.
pub const IMPERSONATION_KEY: &str = "schoolbank_impersonation";

/// Client-local key/value storage (browser local storage, a file, ...).
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

impl<S> LocalStore for Arc<S>
where
    S: LocalStore + ?Sized,
{
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) {
        (**self).remove(key)
    }
}

/// In-memory local store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLocalStore {
    inner: RwLock<HashMap<String, String>>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for InMemoryLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        let map = self.inner.read().ok()?;
        map.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(key.to_string(), value);
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(key);
        }
    }
}

/// One signed-in caller and their optional impersonation.
pub struct Session<L> {
    store: L,
    signed_in: Option<(Identity, Profile)>,
    impersonating: Option<ImpersonationContext>,
}

impl<L: LocalStore> Session<L> {
    pub fn new(store: L) -> Self {
        Self {
            store,
            signed_in: None,
            impersonating: None,
        }
    }

    /// Attach a resolved profile and restore a saved impersonation, if the
    /// profile is a superadmin.
    pub fn sign_in(&mut self, identity: Identity, profile: Profile) {
        self.impersonating = None;
        if profile.role == Role::SuperAdmin {
            self.impersonating = self.load_saved();
        }
        self.signed_in = Some((identity, profile));
    }

    fn load_saved(&self) -> Option<ImpersonationContext> {
        let raw = self.store.get(IMPERSONATION_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                warn!(error = %e, "discarding unreadable saved impersonation");
                self.store.remove(IMPERSONATION_KEY);
                None
            }
        }
    }

    /// Begin acting as the admin of `school_id`. Checked against the real role.
    pub fn start_impersonation(
        &mut self,
        school_id: SchoolId,
        school_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<&ImpersonationContext, AuthzError> {
        let (_, profile) = self.signed_in.as_ref().ok_or(AuthzError::Unauthenticated)?;
        let ctx = ImpersonationContext::start(profile.role, school_id, school_name, now)?;
        match serde_json::to_string(&ctx) {
            Ok(raw) => self.store.set(IMPERSONATION_KEY, raw),
            Err(e) => warn!(error = %e, "impersonation will not survive a reload"),
        }
        debug!(school_id = %ctx.school_id, "impersonation started");
        Ok(self.impersonating.insert(ctx))
    }

    pub fn stop_impersonation(&mut self) {
        self.impersonating = None;
        self.store.remove(IMPERSONATION_KEY);
    }

    pub fn logout(&mut self) {
        self.stop_impersonation();
        self.signed_in = None;
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonating.is_some()
    }

    pub fn impersonation(&self) -> Option<&ImpersonationContext> {
        self.impersonating.as_ref()
    }

    /// The effective scope for the signed-in caller, if any.
    pub fn scope(&self) -> Option<EffectiveScope> {
        let (identity, profile) = self.signed_in.as_ref()?;
        Some(EffectiveScope::derive(
            identity.clone(),
            profile,
            self.impersonating.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use schoolbank_core::UserId;

    use super::*;

    fn signed_in(role: Role, store: Arc<InMemoryLocalStore>) -> Session<Arc<InMemoryLocalStore>> {
        let identity = Identity::new(UserId::new("u"), "u@example.org");
        let school = (role != Role::SuperAdmin).then(|| SchoolId::new("home"));
        let profile = Profile::new(identity.id.clone(), &identity.email, "U", role, school);
        let mut session = Session::new(store);
        session.sign_in(identity, profile);
        session
    }

    #[test]
    fn impersonation_is_persisted_and_restored_for_superadmins() {
        let store = Arc::new(InMemoryLocalStore::new());
        let mut session = signed_in(Role::SuperAdmin, store.clone());
        session
            .start_impersonation(SchoolId::new("a"), "School A", Utc::now())
            .unwrap();
        assert!(store.get(IMPERSONATION_KEY).is_some());

        // A fresh session over the same local storage picks it back up.
        let restored = signed_in(Role::SuperAdmin, store.clone());
        let scope = restored.scope().unwrap();
        assert!(scope.is_impersonating());
        assert_eq!(scope.school_id().unwrap().as_str(), "a");
    }

    #[test]
    fn saved_impersonation_is_not_applied_to_other_roles() {
        let store = Arc::new(InMemoryLocalStore::new());
        let mut root = signed_in(Role::SuperAdmin, store.clone());
        root.start_impersonation(SchoolId::new("a"), "A", Utc::now()).unwrap();

        let admin = signed_in(Role::Admin, store.clone());
        assert!(!admin.is_impersonating());
        assert_eq!(admin.scope().unwrap().school_id().unwrap().as_str(), "home");
    }

    #[test]
    fn non_superadmin_cannot_start() {
        let store = Arc::new(InMemoryLocalStore::new());
        let mut session = signed_in(Role::Admin, store.clone());
        assert!(session.start_impersonation(SchoolId::new("a"), "A", Utc::now()).is_err());
        assert!(store.get(IMPERSONATION_KEY).is_none());
    }

    #[test]
    fn exit_and_logout_clear_local_storage() {
        let store = Arc::new(InMemoryLocalStore::new());
        let mut session = signed_in(Role::SuperAdmin, store.clone());
        session.start_impersonation(SchoolId::new("a"), "A", Utc::now()).unwrap();
        session.stop_impersonation();
        assert!(store.get(IMPERSONATION_KEY).is_none());
        assert_eq!(session.scope().unwrap().role(), Role::SuperAdmin);

        session.start_impersonation(SchoolId::new("a"), "A", Utc::now()).unwrap();
        session.logout();
        assert!(store.get(IMPERSONATION_KEY).is_none());
        assert!(session.scope().is_none());
    }

    #[test]
    fn corrupt_saved_state_is_discarded() {
        let store = Arc::new(InMemoryLocalStore::new());
        store.set(IMPERSONATION_KEY, "{not json".to_string());
        let session = signed_in(Role::SuperAdmin, store.clone());
        assert!(!session.is_impersonating());
        assert!(store.get(IMPERSONATION_KEY).is_none());
    }
}
