//! Shared fixtures for infra unit tests.

use std::sync::Arc;

use schoolbank_auth::{EffectiveScope, Identity, Profile, Role};
use schoolbank_core::{SchoolId, UserId};
use schoolbank_ledger::{NewSchool, School};

use crate::document_store::InMemoryDocumentStore;
use crate::repository::{ProfileDirectory, SchoolDirectory};

pub(crate) fn scope_of(profile: &Profile) -> EffectiveScope {
    EffectiveScope::derive(
        Identity::new(profile.id.clone(), profile.email.clone()),
        profile,
        None,
    )
}

pub(crate) fn superadmin_profile() -> Profile {
    Profile::new(UserId::new("root"), "root@schoolbank.test", "Root", Role::SuperAdmin, None)
}

pub(crate) fn superadmin() -> EffectiveScope {
    scope_of(&superadmin_profile())
}

pub(crate) fn staff(id: &str, role: Role, school: &SchoolId) -> Profile {
    Profile::new(
        UserId::new(id),
        &format!("{id}@schoolbank.test"),
        id.to_uppercase(),
        role,
        Some(school.clone()),
    )
}

/// One school with a stored admin and teacher.
pub(crate) struct Fixture {
    pub store: Arc<InMemoryDocumentStore>,
    pub school: School,
    pub admin: EffectiveScope,
    pub teacher: EffectiveScope,
}

pub(crate) async fn fixture() -> Fixture {
    fixture_with(NewSchool {
        name: "Scuola Verdi".to_string(),
        ..Default::default()
    })
    .await
}

pub(crate) async fn fixture_with(new: NewSchool) -> Fixture {
    let store = Arc::new(InMemoryDocumentStore::new());
    let school = SchoolDirectory::new(store.clone())
        .create(&superadmin(), new)
        .await
        .expect("seed school");

    let profiles = ProfileDirectory::new(store.clone());
    let admin = profiles
        .create(&staff("admin", Role::Admin, &school.id))
        .await
        .expect("seed admin");
    let teacher = profiles
        .create(&staff("teacher", Role::Teacher, &school.id))
        .await
        .expect("seed teacher");

    Fixture {
        store,
        admin: scope_of(&admin),
        teacher: scope_of(&teacher),
        school,
    }
}
