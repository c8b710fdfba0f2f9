use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use schoolbank_auth::{EffectiveScope, Profile, ProfileStatus, Role, normalize_email};
use schoolbank_core::{DomainError, DomainResult, Entity, SchoolId, UserId};
use schoolbank_ledger::{Class, NewSchool, School, SchoolStatus, Student, TENANT_COLLECTIONS};

use super::{CREATED_AT, decode_all, entity_error, with_stamp};
use crate::document_store::{
    CollectionPath, DocPath, Document, DocumentStore, Direction, Fields, Query, WriteBatch,
    WriteOp, encode,
};

/// Upper bound on the writes in one cascade-delete batch.
pub const CASCADE_BATCH_SIZE: usize = 400;

pub(crate) fn profile_path(id: &UserId) -> DocPath {
    CollectionPath::root(Profile::COLLECTION).doc(id)
}

pub(crate) fn school_path(id: &SchoolId) -> DocPath {
    CollectionPath::root(School::COLLECTION).doc(id)
}

fn require_superadmin(caller: &EffectiveScope) -> DomainResult<()> {
    if caller.role() == Role::SuperAdmin {
        Ok(())
    } else {
        Err(DomainError::permission_denied(format!(
            "role '{}' may not manage schools",
            caller.role()
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Profiles
// ─────────────────────────────────────────────────────────────────────────────

/// Non-scoped access to staff profiles (`users`).
#[derive(Debug, Clone)]
pub struct ProfileDirectory<S> {
    store: S,
}

impl<S> ProfileDirectory<S>
where
    S: DocumentStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &UserId) -> DomainResult<Option<Profile>> {
        let doc = self.store.get(&profile_path(id)).await?;
        Ok(doc.map(|d| d.decode::<Profile>()).transpose()?)
    }

    pub async fn require(&self, id: &UserId) -> DomainResult<Profile> {
        self.get(id).await?.ok_or(DomainError::NotFound(Profile::KIND))
    }

    pub async fn find_by_email(&self, email: &str) -> DomainResult<Option<Profile>> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Ok(None);
        }
        let docs = self
            .store
            .query(
                &CollectionPath::root(Profile::COLLECTION),
                &Query::new().where_eq("email", email).limit(1),
            )
            .await?;
        Ok(decode_all::<Profile>(&docs)?.into_iter().next())
    }

    /// Profiles belonging to `school_id`, optionally one role, ordered by name.
    pub async fn school_users(
        &self,
        school_id: &SchoolId,
        role: Option<Role>,
    ) -> DomainResult<Vec<Profile>> {
        let mut query = Query::new()
            .where_eq("schoolId", school_id.as_str())
            .order_by("name", Direction::Ascending);
        if let Some(role) = role {
            query = query.where_eq("role", role.as_str());
        }
        let docs = self
            .store
            .query(&CollectionPath::root(Profile::COLLECTION), &query)
            .await?;
        decode_all(&docs)
    }

    pub async fn teachers(&self, school_id: &SchoolId) -> DomainResult<Vec<Profile>> {
        self.school_users(school_id, Some(Role::Teacher)).await
    }

    /// Make sure a superadmin profile exists for `email`, creating a
    /// `pending` placeholder that the owning identity links on first login.
    #[instrument(skip(self), err)]
    pub async fn ensure_superadmin(&self, email: &str) -> DomainResult<Profile> {
        if let Some(existing) = self.find_by_email(email).await? {
            if existing.role != Role::SuperAdmin {
                return Err(DomainError::already_exists(format!(
                    "'{}' already belongs to a {} profile",
                    existing.email, existing.role
                )));
            }
            return Ok(existing);
        }
        let mut profile = Profile::new(UserId::generate(), email, "Superadmin", Role::SuperAdmin, None);
        profile.status = ProfileStatus::Pending;
        let profile = self.create(&profile).await?;
        info!(email = %profile.email, "superadmin placeholder created");
        Ok(profile)
    }

    /// Write a new profile keyed by its id, stamping `createdAt`.
    pub(crate) async fn create(&self, profile: &Profile) -> DomainResult<Profile> {
        let path = profile_path(&profile.id);
        let fields = encode(profile)?;
        let result = self
            .store
            .commit(WriteBatch::new().with(WriteOp::create(path.clone(), fields.clone()).stamped(CREATED_AT)))
            .await?;
        let doc = Document {
            path,
            fields: with_stamp(fields, CREATED_AT, result.commit_time),
        };
        Ok(doc.decode()?)
    }

    pub(crate) async fn update(&self, id: &UserId, fields: Fields) -> DomainResult<Profile> {
        self.store
            .commit(WriteBatch::new().with(WriteOp::update(profile_path(id), fields).stamped("updatedAt")))
            .await
            .map_err(entity_error::<Profile>)?;
        self.require(id).await
    }

    pub(crate) async fn delete(&self, id: &UserId) -> DomainResult<()> {
        self.store
            .commit(WriteBatch::new().with(WriteOp::delete(profile_path(id))))
            .await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schools
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolStats {
    pub students: usize,
    pub teachers: usize,
    pub classes: usize,
}

/// Outcome of tearing a school down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub school_id: SchoolId,
    pub deleted_documents: usize,
    /// Staff profiles still pointing at the school; they follow the identity
    /// lifecycle and must be deprovisioned separately.
    pub remaining_profiles: usize,
}

/// Superadmin access to the `schools` collection.
#[derive(Debug, Clone)]
pub struct SchoolDirectory<S> {
    store: S,
}

impl<S> SchoolDirectory<S>
where
    S: DocumentStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &SchoolId) -> DomainResult<Option<School>> {
        let doc = self.store.get(&school_path(id)).await?;
        Ok(doc.map(|d| d.decode::<School>()).transpose()?)
    }

    pub async fn require(&self, id: &SchoolId) -> DomainResult<School> {
        self.get(id).await?.ok_or(DomainError::NotFound(School::KIND))
    }

    /// All schools ordered by name.
    pub async fn list(&self, caller: &EffectiveScope) -> DomainResult<Vec<School>> {
        require_superadmin(caller)?;
        let docs = self
            .store
            .query(&CollectionPath::root(School::COLLECTION), &Query::new())
            .await?;
        let mut schools: Vec<School> = decode_all(&docs)?;
        schools.sort_by(|a, b| a.config.name.cmp(&b.config.name));
        Ok(schools)
    }

    #[instrument(skip(self, caller, new), fields(caller = %caller.user_id()), err)]
    pub async fn create(&self, caller: &EffectiveScope, new: NewSchool) -> DomainResult<School> {
        require_superadmin(caller)?;
        let school = new.into_school(SchoolId::generate())?;
        let path = school_path(&school.id);
        let fields = encode(&school)?;
        let result = self
            .store
            .commit(WriteBatch::new().with(WriteOp::create(path.clone(), fields.clone()).stamped(CREATED_AT)))
            .await?;
        info!(school_id = %school.id, name = %school.config.name, "school created");
        let doc = Document {
            path,
            fields: with_stamp(fields, CREATED_AT, result.commit_time),
        };
        Ok(doc.decode()?)
    }

    pub async fn stats(&self, caller: &EffectiveScope, id: &SchoolId) -> DomainResult<SchoolStats> {
        require_superadmin(caller)?;
        self.require(id).await?;
        let students = self
            .store
            .query(&CollectionPath::nested(id, Student::COLLECTION), &Query::new())
            .await?;
        let classes = self
            .store
            .query(&CollectionPath::nested(id, Class::COLLECTION), &Query::new())
            .await?;
        let teachers = ProfileDirectory::new(self.store.clone()).teachers(id).await?;
        Ok(SchoolStats {
            students: students.len(),
            teachers: teachers.len(),
            classes: classes.len(),
        })
    }

    /// Quarantine the school, delete every tenant sub-collection in bounded
    /// single-partition batches, then delete the school document.
    ///
    /// Safe to re-run after a partial failure: the school stays quarantined
    /// and the remaining documents are picked up again.
    #[instrument(skip(self, caller), fields(caller = %caller.user_id()), err)]
    pub async fn cascade_delete(
        &self,
        caller: &EffectiveScope,
        id: &SchoolId,
    ) -> DomainResult<CascadeReport> {
        require_superadmin(caller)?;
        let school = self.require(id).await?;

        if school.status != SchoolStatus::Quarantined {
            let mut fields = Fields::new();
            fields.insert(
                "status".to_string(),
                JsonValue::String("quarantined".to_string()),
            );
            self.store
                .commit(WriteBatch::new().with(WriteOp::update(school_path(id), fields).stamped("quarantinedAt")))
                .await
                .map_err(entity_error::<School>)?;
            warn!(school_id = %id, "school quarantined for deletion");
        }

        let mut deleted = 0usize;
        for name in TENANT_COLLECTIONS {
            let collection = CollectionPath::nested(id, name);
            loop {
                let page = self
                    .store
                    .query(&collection, &Query::new().limit(CASCADE_BATCH_SIZE))
                    .await?;
                if page.is_empty() {
                    break;
                }
                let mut batch = WriteBatch::new();
                for doc in &page {
                    batch.push(WriteOp::delete(doc.path.clone()));
                }
                self.store.commit(batch).await?;
                deleted += page.len();
            }
        }

        self.store
            .commit(WriteBatch::new().with(WriteOp::delete(school_path(id))))
            .await?;

        let remaining_profiles = ProfileDirectory::new(self.store.clone())
            .school_users(id, None)
            .await?
            .len();
        info!(
            school_id = %id,
            deleted_documents = deleted,
            remaining_profiles,
            "school deleted"
        );
        Ok(CascadeReport {
            school_id: id.clone(),
            deleted_documents: deleted,
            remaining_profiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use schoolbank_auth::Identity;
    use schoolbank_core::EntityKind;
    use schoolbank_ledger::NewStudent;

    use super::*;
    use crate::document_store::InMemoryDocumentStore;
    use crate::repository::TenantRepository;

    fn scope(profile: &Profile) -> EffectiveScope {
        EffectiveScope::derive(
            Identity::new(profile.id.clone(), profile.email.clone()),
            profile,
            None,
        )
    }

    fn root() -> EffectiveScope {
        scope(&Profile::new(UserId::new("root"), "root@x.test", "Root", Role::SuperAdmin, None))
    }

    fn admin_of(school: &SchoolId) -> EffectiveScope {
        scope(&Profile::new(
            UserId::new("adm"),
            "adm@x.test",
            "Adm",
            Role::Admin,
            Some(school.clone()),
        ))
    }

    #[tokio::test]
    async fn only_superadmins_manage_schools() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let dir = SchoolDirectory::new(store.clone());
        let school = dir
            .create(&root(), NewSchool { name: "Verdi".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(school.config.currency_name, "Dollari");
        assert!(school.created_at.is_some());

        let err = dir.list(&admin_of(&school.id)).await.unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let profiles = ProfileDirectory::new(store.clone());
        let p = Profile::new(UserId::new("u1"), "Maria@School.test", "Maria", Role::Teacher, None);
        profiles.create(&p).await.unwrap();
        let found = profiles.find_by_email("  MARIA@school.TEST ").await.unwrap().unwrap();
        assert_eq!(found.id, UserId::new("u1"));
    }

    #[tokio::test]
    async fn superadmin_bootstrap_is_idempotent() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let profiles = ProfileDirectory::new(store.clone());
        let first = profiles.ensure_superadmin("Root@School.test").await.unwrap();
        assert!(first.is_pending());
        assert_eq!(first.role, Role::SuperAdmin);
        let again = profiles.ensure_superadmin("root@school.test").await.unwrap();
        assert_eq!(again.id, first.id);

        let teacher = Profile::new(UserId::new("t"), "t@school.test", "T", Role::Teacher, None);
        profiles.create(&teacher).await.unwrap();
        let err = profiles.ensure_superadmin("t@school.test").await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn cascade_delete_removes_tenant_data_and_reports_staff() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let dir = SchoolDirectory::new(store.clone());
        let doomed = dir
            .create(&root(), NewSchool { name: "Doomed".into(), ..Default::default() })
            .await
            .unwrap();
        let kept = dir
            .create(&root(), NewSchool { name: "Kept".into(), ..Default::default() })
            .await
            .unwrap();

        let doomed_repo = TenantRepository::for_scope(store.clone(), &admin_of(&doomed.id)).unwrap();
        for i in 0..3 {
            doomed_repo
                .create_student(NewStudent { name: format!("s{i}"), ..Default::default() })
                .await
                .unwrap();
        }
        let kept_repo = TenantRepository::for_scope(store.clone(), &admin_of(&kept.id)).unwrap();
        kept_repo
            .create_student(NewStudent { name: "safe".into(), ..Default::default() })
            .await
            .unwrap();

        let teacher = Profile::new(
            UserId::new("t1"),
            "t1@x.test",
            "T",
            Role::Teacher,
            Some(doomed.id.clone()),
        );
        ProfileDirectory::new(store.clone()).create(&teacher).await.unwrap();

        let report = dir.cascade_delete(&root(), &doomed.id).await.unwrap();
        assert_eq!(report.deleted_documents, 3);
        assert_eq!(report.remaining_profiles, 1);

        assert!(dir.get(&doomed.id).await.unwrap().is_none());
        assert!(doomed_repo.students(None).await.unwrap().is_empty());
        assert_eq!(kept_repo.students(None).await.unwrap().len(), 1);

        let err = dir.stats(&root(), &doomed.id).await.unwrap_err();
        assert_eq!(err, DomainError::NotFound(EntityKind::School));
    }

    #[tokio::test]
    async fn school_stats_count_students_teachers_classes() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let dir = SchoolDirectory::new(store.clone());
        let s = dir
            .create(&root(), NewSchool { name: "Verdi".into(), ..Default::default() })
            .await
            .unwrap();
        let repo = TenantRepository::for_scope(store.clone(), &admin_of(&s.id)).unwrap();
        repo.create_class(schoolbank_ledger::NewClass { name: "1A".into() }).await.unwrap();
        repo.create_student(NewStudent { name: "x".into(), ..Default::default() })
            .await
            .unwrap();
        ProfileDirectory::new(store.clone())
            .create(&Profile::new(UserId::new("t"), "t@x.test", "T", Role::Teacher, Some(s.id.clone())))
            .await
            .unwrap();

        let stats = dir.stats(&root(), &s.id).await.unwrap();
        assert_eq!(stats, SchoolStats { students: 1, teachers: 1, classes: 1 });
    }
}
