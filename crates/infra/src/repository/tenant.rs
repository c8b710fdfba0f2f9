use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use schoolbank_auth::EffectiveScope;
use schoolbank_core::{
    ClassId, DomainError, DomainResult, Entity, QuickRewardId, RewardId, SchoolId, StudentId,
    SubjectId,
};
use schoolbank_ledger::{
    Class, FieldMap, NewClass, NewQuickReward, NewReward, NewStudent, NewSubject, QuickReward,
    RequestStatus, Reward, RewardRequest, RewardUpdate, School, Student, StudentUpdate, Subject,
    Transaction, TransactionFilter, normalize_nfc_tag,
};

use super::{CREATED_AT, UPDATED_AT, decode_all, entity_error, with_stamp};
use crate::document_store::{
    CollectionPath, DocPath, Document, DocumentStore, Direction, Query, WriteBatch, WriteOp,
    encode,
};
use crate::repository::ProfileDirectory;

/// Dashboard counters for one school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStats {
    pub students: usize,
    pub classes: usize,
    pub teachers: usize,
    pub total_balance: i64,
}

/// Accessor bound to the effective school of one caller.
///
/// There is no way to build one without a resolved school, and no method takes
/// a school id.
#[derive(Debug, Clone)]
pub struct TenantRepository<S> {
    store: S,
    school_id: SchoolId,
}

impl<S> TenantRepository<S>
where
    S: DocumentStore,
{
    /// Fails with `NoTenantContext` when the scope has no school.
    pub fn for_scope(store: S, scope: &EffectiveScope) -> DomainResult<Self> {
        let school_id = scope.require_school()?.clone();
        Ok(Self { store, school_id })
    }

    pub fn school_id(&self) -> &SchoolId {
        &self.school_id
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub fn collection<E: Entity>(&self) -> CollectionPath {
        CollectionPath::nested(&self.school_id, E::COLLECTION)
    }

    pub fn doc_path<E: Entity>(&self, id: &E::Id) -> DocPath {
        self.collection::<E>().doc(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Generic access
    // ─────────────────────────────────────────────────────────────────────

    pub async fn find<E: Entity>(&self, id: &E::Id) -> DomainResult<Option<E>> {
        let doc = self.store.get(&self.doc_path::<E>(id)).await?;
        Ok(doc.map(|d| d.decode::<E>()).transpose()?)
    }

    /// Point lookup; `NotFound(E::KIND)` when absent.
    pub async fn get<E: Entity>(&self, id: &E::Id) -> DomainResult<E> {
        self.find(id).await?.ok_or(DomainError::NotFound(E::KIND))
    }

    pub async fn list<E: Entity>(&self, query: &Query) -> DomainResult<Vec<E>> {
        let docs = self.store.query(&self.collection::<E>(), query).await?;
        decode_all(&docs)
    }

    /// Create with a server-stamped `createdAt`.
    pub(crate) async fn insert<E: Entity>(&self, entity: &E) -> DomainResult<E> {
        let path = self.doc_path::<E>(entity.id());
        let fields = encode(entity)?;
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

    /// Merge exactly `fields`, with a server-stamped `updatedAt`.
    pub(crate) async fn patch<E: Entity>(&self, id: &E::Id, fields: FieldMap) -> DomainResult<E> {
        if fields.is_empty() {
            return self.get(id).await;
        }
        self.store
            .commit(WriteBatch::new().with(WriteOp::update(self.doc_path::<E>(id), fields).stamped(UPDATED_AT)))
            .await
            .map_err(entity_error::<E>)?;
        self.get(id).await
    }

    pub(crate) async fn remove<E: Entity>(&self, id: &E::Id) -> DomainResult<()> {
        let path = self.doc_path::<E>(id);
        if self.store.get(&path).await?.is_none() {
            return Err(DomainError::NotFound(E::KIND));
        }
        self.store.commit(WriteBatch::new().with(WriteOp::delete(path))).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // School
    // ─────────────────────────────────────────────────────────────────────

    pub async fn school(&self) -> DomainResult<School> {
        let path = CollectionPath::root(School::COLLECTION).doc(&self.school_id);
        let doc = self
            .store
            .get(&path)
            .await?
            .ok_or(DomainError::NotFound(School::KIND))?;
        Ok(doc.decode()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Students
    // ─────────────────────────────────────────────────────────────────────

    /// Students ordered by name, optionally only one class.
    pub async fn students(&self, class_id: Option<&ClassId>) -> DomainResult<Vec<Student>> {
        let mut query = Query::new().order_by("name", Direction::Ascending);
        if let Some(class_id) = class_id {
            query = query.where_eq("classId", class_id.as_str());
        }
        self.list(&query).await
    }

    pub async fn student_by_nfc(&self, tag: &str) -> DomainResult<Option<Student>> {
        let Some(tag) = normalize_nfc_tag(tag) else {
            return Ok(None);
        };
        let found: Vec<Student> = self
            .list(&Query::new().where_eq("nfcTag", tag).limit(1))
            .await?;
        Ok(found.into_iter().next())
    }

    async fn ensure_nfc_tag_free(&self, tag: &str, owner: Option<&StudentId>) -> DomainResult<()> {
        match self.student_by_nfc(tag).await? {
            Some(existing) if Some(&existing.id) != owner => Err(DomainError::already_exists(
                format!("nfc tag {tag} is already assigned"),
            )),
            _ => Ok(()),
        }
    }

    async fn ensure_class_exists(&self, class_id: &ClassId) -> DomainResult<()> {
        self.get::<Class>(class_id).await.map(|_| ())
    }

    #[instrument(skip(self, new), fields(school_id = %self.school_id), err)]
    pub async fn create_student(&self, new: NewStudent) -> DomainResult<Student> {
        let student = new.into_student(StudentId::generate())?;
        if let Some(class_id) = &student.class_id {
            self.ensure_class_exists(class_id).await?;
        }
        if let Some(tag) = &student.nfc_tag {
            self.ensure_nfc_tag_free(tag, None).await?;
        }
        let student = self.insert(&student).await?;
        debug!(student_id = %student.id, "student created");
        Ok(student)
    }

    pub async fn update_student(&self, id: &StudentId, update: StudentUpdate) -> DomainResult<Student> {
        let fields = update.fields()?;
        if let Some(Some(class_id)) = &update.class_id {
            self.ensure_class_exists(class_id).await?;
        }
        if let Some(tag) = update.assigned_nfc_tag() {
            self.ensure_nfc_tag_free(&tag, Some(id)).await?;
        }
        self.patch::<Student>(id, fields).await
    }

    /// Removes the student document; its transactions stay in the log.
    pub async fn delete_student(&self, id: &StudentId) -> DomainResult<()> {
        self.remove::<Student>(id).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Classes and subjects
    // ─────────────────────────────────────────────────────────────────────

    pub async fn classes(&self) -> DomainResult<Vec<Class>> {
        self.list(&Query::new().order_by("name", Direction::Ascending)).await
    }

    pub async fn create_class(&self, new: NewClass) -> DomainResult<Class> {
        let class = new.into_class(ClassId::generate())?;
        self.insert(&class).await
    }

    pub async fn rename_class(&self, id: &ClassId, name: &str) -> DomainResult<Class> {
        let renamed = NewClass { name: name.to_string() }.into_class(id.clone())?;
        self.patch::<Class>(id, name_field(renamed.name)).await
    }

    pub async fn delete_class(&self, id: &ClassId) -> DomainResult<()> {
        self.remove::<Class>(id).await
    }

    pub async fn subjects(&self) -> DomainResult<Vec<Subject>> {
        self.list(&Query::new().order_by("name", Direction::Ascending)).await
    }

    pub async fn create_subject(&self, new: NewSubject) -> DomainResult<Subject> {
        let subject = new.into_subject(SubjectId::generate())?;
        self.insert(&subject).await
    }

    pub async fn rename_subject(&self, id: &SubjectId, name: &str) -> DomainResult<Subject> {
        let renamed = NewSubject { name: name.to_string() }.into_subject(id.clone())?;
        self.patch::<Subject>(id, name_field(renamed.name)).await
    }

    pub async fn delete_subject(&self, id: &SubjectId) -> DomainResult<()> {
        self.remove::<Subject>(id).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rewards
    // ─────────────────────────────────────────────────────────────────────

    /// Rewards ordered by cost, cheapest first.
    pub async fn rewards(&self) -> DomainResult<Vec<Reward>> {
        self.list(&Query::new().order_by("cost", Direction::Ascending)).await
    }

    pub async fn create_reward(&self, new: NewReward) -> DomainResult<Reward> {
        let reward = new.into_reward(RewardId::generate())?;
        self.insert(&reward).await
    }

    pub async fn update_reward(&self, id: &RewardId, update: RewardUpdate) -> DomainResult<Reward> {
        self.patch::<Reward>(id, update.fields()?).await
    }

    /// Preset awards, largest amount first.
    pub async fn quick_rewards(&self) -> DomainResult<Vec<QuickReward>> {
        self.list(&Query::new().order_by("amount", Direction::Descending)).await
    }

    pub async fn create_quick_reward(&self, new: NewQuickReward) -> DomainResult<QuickReward> {
        let quick = new.into_quick_reward(QuickRewardId::generate())?;
        self.insert(&quick).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ledger reads
    // ─────────────────────────────────────────────────────────────────────

    /// Newest transactions first, at most `limit` (default 50).
    ///
    /// The teacher filter is fetched unordered and sorted here by timestamp
    /// descending, so it needs no composite index on the store.
    pub async fn transactions(
        &self,
        filter: &TransactionFilter,
        limit: Option<usize>,
    ) -> DomainResult<Vec<Transaction>> {
        let limit = limit.unwrap_or(TransactionFilter::DEFAULT_LIMIT);
        let ordered = Query::new().order_by("timestamp", Direction::Descending).limit(limit);

        match filter {
            TransactionFilter::All => self.list(&ordered).await,
            TransactionFilter::Student(id) => {
                self.list(&ordered.where_eq("studentId", id.as_str())).await
            }
            TransactionFilter::Class(id) => {
                self.list(&ordered.where_eq("classId", id.as_str())).await
            }
            TransactionFilter::Teacher(id) => {
                let mut found: Vec<Transaction> = self
                    .list(&Query::new().where_eq("teacherId", id.as_str()))
                    .await?;
                found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                found.truncate(limit);
                Ok(found)
            }
        }
    }

    /// Requests in one state (default pending), newest first.
    pub async fn reward_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> DomainResult<Vec<RewardRequest>> {
        let status = status.unwrap_or(RequestStatus::Pending);
        self.list(
            &Query::new()
                .where_eq("status", status.as_str())
                .order_by("requestedAt", Direction::Descending),
        )
        .await
    }
}

impl<S> TenantRepository<S>
where
    S: DocumentStore + Clone,
{
    /// Counters for the current school. Teachers are counted through the
    /// non-scoped profile directory, filtered by this school only.
    pub async fn stats(&self) -> DomainResult<TenantStats> {
        let students = self.students(None).await?;
        let classes = self.store.query(&self.collection::<Class>(), &Query::new()).await?;
        let teachers = ProfileDirectory::new(self.store.clone())
            .teachers(&self.school_id)
            .await?;
        let total_balance = students
            .iter()
            .try_fold(0i64, |total, s| total.checked_add(s.balance))
            .ok_or_else(|| DomainError::invalid_argument("total balance is out of range"))?;
        Ok(TenantStats {
            students: students.len(),
            classes: classes.len(),
            teachers: teachers.len(),
            total_balance,
        })
    }
}

fn name_field(name: String) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("name".to_string(), JsonValue::String(name));
    fields
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use schoolbank_auth::{Identity, Profile, Role};
    use schoolbank_core::{TransactionId, UserId};
    use schoolbank_ledger::TransactionKind;

    use super::*;
    use crate::document_store::InMemoryDocumentStore;

    fn scope_for(school: &str) -> EffectiveScope {
        let profile = Profile::new(
            UserId::new("admin"),
            "admin@school.test",
            "Admin",
            Role::Admin,
            Some(SchoolId::new(school)),
        );
        EffectiveScope::derive(Identity::new(profile.id.clone(), profile.email.clone()), &profile, None)
    }

    fn repo(store: &Arc<InMemoryDocumentStore>, school: &str) -> TenantRepository<Arc<InMemoryDocumentStore>> {
        TenantRepository::for_scope(store.clone(), &scope_for(school)).unwrap()
    }

    fn new_student(name: &str) -> NewStudent {
        NewStudent {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn scope_without_school_has_no_tenant_context() {
        let profile = Profile::new(UserId::new("root"), "root@x.test", "Root", Role::SuperAdmin, None);
        let scope = EffectiveScope::derive(Identity::new(profile.id.clone(), "root@x.test"), &profile, None);
        let err = TenantRepository::for_scope(Arc::new(InMemoryDocumentStore::new()), &scope).unwrap_err();
        assert_eq!(err, DomainError::NoTenantContext);
    }

    #[tokio::test]
    async fn tenants_never_see_each_other() {
        let store = Arc::new(InMemoryDocumentStore::new());
        repo(&store, "a").create_student(new_student("Anna")).await.unwrap();
        repo(&store, "b").create_student(new_student("Bruno")).await.unwrap();

        let names: Vec<_> = repo(&store, "a")
            .students(None)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Anna"]);
    }

    #[tokio::test]
    async fn create_student_forces_zero_balance_and_stamps_created_at() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let s = repo(&store, "a").create_student(new_student("Anna")).await.unwrap();
        assert_eq!(s.balance, 0);
        assert!(s.created_at.is_some());
        let reread: Student = repo(&store, "a").get(&s.id).await.unwrap();
        assert_eq!(reread.created_at, s.created_at);
    }

    #[tokio::test]
    async fn nfc_tags_are_unique_per_school() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let r = repo(&store, "a");
        let first = r
            .create_student(NewStudent { nfc_tag: Some("abc".into()), ..new_student("Anna") })
            .await
            .unwrap();
        let err = r
            .create_student(NewStudent { nfc_tag: Some("ABC".into()), ..new_student("Bice") })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists(_)));

        // Same tag in another school is fine.
        repo(&store, "b")
            .create_student(NewStudent { nfc_tag: Some("abc".into()), ..new_student("Carlo") })
            .await
            .unwrap();

        let found = r.student_by_nfc(" abc ").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);

        // Re-saving the owner's own tag is not a conflict.
        let update = StudentUpdate { nfc_tag: Some(Some("abc".into())), ..Default::default() };
        r.update_student(&first.id, update).await.unwrap();
    }

    #[tokio::test]
    async fn student_update_requires_existing_class_and_student() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let r = repo(&store, "a");
        let s = r.create_student(new_student("Anna")).await.unwrap();

        let update = StudentUpdate { class_id: Some(Some(ClassId::new("nope"))), ..Default::default() };
        let err = r.update_student(&s.id, update).await.unwrap_err();
        assert_eq!(err, DomainError::NotFound(schoolbank_core::EntityKind::Class));

        let rename = StudentUpdate { name: Some("Anna B".into()), ..Default::default() };
        let err = r.update_student(&StudentId::new("ghost"), rename.clone()).await.unwrap_err();
        assert_eq!(err, DomainError::NotFound(schoolbank_core::EntityKind::Student));

        let updated = r.update_student(&s.id, rename).await.unwrap();
        assert_eq!(updated.name, "Anna B");
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn listings_follow_catalog_orderings() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let r = repo(&store, "a");
        for (name, cost) in [("Pen", 20), ("Book", 5), ("Trip", 90)] {
            r.create_reward(NewReward { name: name.into(), cost, icon: None }).await.unwrap();
        }
        for (name, amount) in [("Help", 2), ("Great", 10), ("Late", -3)] {
            r.create_quick_reward(NewQuickReward { name: name.into(), amount, icon: None })
                .await
                .unwrap();
        }
        let costs: Vec<_> = r.rewards().await.unwrap().iter().map(|r| r.cost).collect();
        assert_eq!(costs, vec![5, 20, 90]);
        let amounts: Vec<_> = r.quick_rewards().await.unwrap().iter().map(|q| q.amount).collect();
        assert_eq!(amounts, vec![10, 2, -3]);
        assert!(r.rewards().await.unwrap().iter().all(|r| r.active));
    }

    #[tokio::test]
    async fn teacher_filter_sorts_client_side_and_truncates() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let r = repo(&store, "a");
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();

        // Insert out of chronological order, with a different teacher mixed in.
        let mut batch = WriteBatch::new();
        for (i, (teacher, minutes)) in [("t1", 5), ("t2", 50), ("t1", 30), ("t1", 1), ("t1", 20)]
            .into_iter()
            .enumerate()
        {
            let tx = Transaction {
                id: TransactionId::new(format!("tx{i}")),
                student_id: StudentId::new("s"),
                student_name: None,
                class_id: None,
                amount: 1,
                reason: "r".into(),
                icon: String::new(),
                subject_id: None,
                kind: TransactionKind::Reward,
                teacher_id: Some(UserId::new(teacher)),
                teacher_name: teacher.into(),
                timestamp: Some(base + Duration::minutes(minutes)),
                updated_at: None,
            };
            batch.push(WriteOp::create(r.doc_path::<Transaction>(&tx.id), encode(&tx).unwrap()));
        }
        store.commit(batch).await.unwrap();

        let found = r
            .transactions(&TransactionFilter::Teacher(UserId::new("t1")), Some(3))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|t| t.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["tx2", "tx4", "tx0"]);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let err = repo(&store, "a").delete_class(&ClassId::new("x")).await.unwrap_err();
        assert_eq!(err, DomainError::NotFound(schoolbank_core::EntityKind::Class));
    }

    #[tokio::test]
    async fn stats_total_balance_refuses_to_overflow() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let r = repo(&store, "a");
        let anna = r.create_student(new_student("Anna")).await.unwrap();
        let bice = r.create_student(new_student("Bice")).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::increment(r.doc_path::<Student>(&anna.id), "balance", 40));
        batch.push(WriteOp::increment(r.doc_path::<Student>(&bice.id), "balance", -15));
        store.commit(batch).await.unwrap();
        assert_eq!(r.stats().await.unwrap().total_balance, 25);

        store
            .commit(WriteBatch::new().with(WriteOp::increment(
                r.doc_path::<Student>(&anna.id),
                "balance",
                i64::MAX - 40,
            )))
            .await
            .unwrap();
        store
            .commit(WriteBatch::new().with(WriteOp::increment(
                r.doc_path::<Student>(&bice.id),
                "balance",
                1_000,
            )))
            .await
            .unwrap();
        let err = r.stats().await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }
}
