use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use schoolbank_core::{DomainError, SchoolId};

/// Top-level fields of a stored document.
pub type Fields = serde_json::Map<String, JsonValue>;

/// Collection holding every school document; nested collections live under it.
const SCHOOLS: &str = "schools";

/// A collection, either top-level (`users`) or nested under a school
/// (`schools/{s}/students`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn nested(school_id: &SchoolId, name: &str) -> Self {
        Self(format!("{SCHOOLS}/{}/{name}", school_id.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unit of atomicity: the owning school document for nested collections,
    /// the collection itself otherwise.
    pub fn partition(&self) -> &str {
        match self.0.match_indices('/').nth(1) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }

    pub fn doc(&self, id: impl AsRef<str>) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.as_ref().to_string(),
        }
    }
}

impl core::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    collection: CollectionPath,
    id: String,
}

impl DocPath {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn partition(&self) -> &str {
        self.collection.partition()
    }
}

impl core::fmt::Display for DocPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Value a store writes into server-stamped fields.
///
/// Fixed-width so that lexicographic order matches chronological order.
pub fn server_timestamp(at: DateTime<Utc>) -> JsonValue {
    JsonValue::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// A document as read from the store. The id is the key, not part of `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub fields: Fields,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Decode into a typed record, injecting the key under `"id"`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), JsonValue::String(self.path.id().to_string()));
        serde_json::from_value(JsonValue::Object(fields))
            .map_err(|e| StoreError::Decode(format!("{}: {e}", self.path)))
    }
}

/// Encode a typed record into document fields, dropping its `"id"`.
pub fn encode<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value) {
        Ok(JsonValue::Object(mut fields)) => {
            fields.remove("id");
            Ok(fields)
        }
        Ok(other) => Err(StoreError::Decode(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Equality filters, an optional ordering and an optional limit.
///
/// Ordering by a field omits documents where that field is missing or null;
/// ties break on document id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub filters: Vec<(String, JsonValue)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        let filtered = self
            .filters
            .iter()
            .all(|(field, expected)| fields.get(field) == Some(expected));
        let ordered = match &self.order_by {
            Some((field, _)) => !matches!(fields.get(field), None | Some(JsonValue::Null)),
            None => true,
        };
        filtered && ordered
    }
}

/// Total order over JSON scalars: null < string < number < bool < array < object.
pub(crate) fn compare_json(a: &JsonValue, b: &JsonValue) -> Ordering {
    fn rank(v: &JsonValue) -> u8 {
        match v {
            JsonValue::Null => 0,
            JsonValue::String(_) => 1,
            JsonValue::Number(_) => 2,
            JsonValue::Bool(_) => 3,
            JsonValue::Array(_) => 4,
            JsonValue::Object(_) => 5,
        }
    }

    match (a, b) {
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Commit-time requirement on a document's current field value.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub field: String,
    pub equals: JsonValue,
}

impl Precondition {
    pub fn field_equals(field: impl Into<String>, equals: impl Into<JsonValue>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
        }
    }

    pub fn holds(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.equals)
    }
}

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Fails with `AlreadyExists` if the document exists.
    Create {
        path: DocPath,
        fields: Fields,
        stamp: Option<String>,
    },
    /// Replaces the whole document.
    Set {
        path: DocPath,
        fields: Fields,
        stamp: Option<String>,
    },
    /// Merges top-level fields into an existing document.
    Update {
        path: DocPath,
        fields: Fields,
        stamp: Option<String>,
        precondition: Option<Precondition>,
    },
    /// Adds `delta` to an integer field (missing counts as 0).
    Increment {
        path: DocPath,
        field: String,
        delta: i64,
    },
    /// Idempotent.
    Delete { path: DocPath },
}

impl WriteOp {
    pub fn create(path: DocPath, fields: Fields) -> Self {
        WriteOp::Create {
            path,
            fields,
            stamp: None,
        }
    }

    pub fn set(path: DocPath, fields: Fields) -> Self {
        WriteOp::Set {
            path,
            fields,
            stamp: None,
        }
    }

    pub fn update(path: DocPath, fields: Fields) -> Self {
        WriteOp::Update {
            path,
            fields,
            stamp: None,
            precondition: None,
        }
    }

    pub fn increment(path: DocPath, field: impl Into<String>, delta: i64) -> Self {
        WriteOp::Increment {
            path,
            field: field.into(),
            delta,
        }
    }

    pub fn delete(path: DocPath) -> Self {
        WriteOp::Delete { path }
    }

    /// Have the store write its commit time into `field`.
    pub fn stamped(mut self, field: impl Into<String>) -> Self {
        match &mut self {
            WriteOp::Create { stamp, .. }
            | WriteOp::Set { stamp, .. }
            | WriteOp::Update { stamp, .. } => *stamp = Some(field.into()),
            WriteOp::Increment { .. } | WriteOp::Delete { .. } => {}
        }
        self
    }

    /// Only apply an update if the precondition holds at commit time.
    pub fn when(mut self, condition: Precondition) -> Self {
        if let WriteOp::Update { precondition, .. } = &mut self {
            *precondition = Some(condition);
        }
        self
    }

    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Create { path, .. }
            | WriteOp::Set { path, .. }
            | WriteOp::Update { path, .. }
            | WriteOp::Increment { path, .. }
            | WriteOp::Delete { path } => path,
        }
    }
}

/// Writes committed as one unit. All operations must share a partition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn with(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// The single partition this batch writes to.
    pub fn partition(&self) -> Result<Option<&str>, StoreError> {
        let mut partition: Option<&str> = None;
        for op in &self.ops {
            let p = op.path().partition();
            match partition {
                None => partition = Some(p),
                Some(existing) if existing != p => {
                    return Err(StoreError::CrossPartition(existing.to_string(), p.to_string()));
                }
                Some(_) => {}
            }
        }
        Ok(partition)
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    /// The instant written into every stamped field of the batch.
    pub commit_time: DateTime<Utc>,
    increments: Vec<(DocPath, String, i64)>,
}

impl CommitResult {
    pub fn new(commit_time: DateTime<Utc>) -> Self {
        Self {
            commit_time,
            increments: Vec::new(),
        }
    }

    pub fn record_increment(&mut self, path: DocPath, field: String, value: i64) {
        self.increments.push((path, field, value));
    }

    /// Post-commit value of an incremented field.
    pub fn incremented(&self, path: &DocPath, field: &str) -> Option<i64> {
        self.increments
            .iter()
            .rev()
            .find(|(p, f, _)| p == path && f == field)
            .map(|(_, _, v)| *v)
    }
}

/// Document store operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("batch spans partitions '{0}' and '{1}'")]
    CrossPartition(String, String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("failed to decode document: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::AlreadyExists(path) => DomainError::AlreadyExists(path),
            StoreError::PreconditionFailed(msg) => DomainError::InvalidRequestState(msg),
            StoreError::OutOfRange(msg) => DomainError::InvalidArgument(msg),
            other => DomainError::Internal(other.to_string()),
        }
    }
}

/// Tenant-partitioned document store.
///
/// Implementations must:
/// - reject batches spanning partitions before writing anything
/// - apply a batch's operations in order, all or nothing
/// - stamp every requested field of one batch with the same commit time
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError>;

    async fn commit(&self, batch: WriteBatch) -> Result<CommitResult, StoreError>;
}

#[async_trait::async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        (**self).get(path).await
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        (**self).query(collection, query).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitResult, StoreError> {
        (**self).commit(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_school_root_or_top_level_collection() {
        let students = CollectionPath::nested(&SchoolId::new("s1"), "students");
        assert_eq!(students.as_str(), "schools/s1/students");
        assert_eq!(students.partition(), "schools/s1");
        assert_eq!(students.doc("a").partition(), "schools/s1");
        assert_eq!(CollectionPath::root("users").partition(), "users");
        assert_eq!(CollectionPath::root("schools").doc("s1").partition(), "schools");
    }

    #[test]
    fn batch_spanning_two_schools_is_rejected() {
        let a = CollectionPath::nested(&SchoolId::new("a"), "students");
        let b = CollectionPath::nested(&SchoolId::new("b"), "transactions");
        let batch = WriteBatch::new()
            .with(WriteOp::increment(a.doc("x"), "balance", 1))
            .with(WriteOp::delete(b.doc("y")));
        assert!(matches!(batch.partition(), Err(StoreError::CrossPartition(_, _))));

        let same = WriteBatch::new()
            .with(WriteOp::increment(a.doc("x"), "balance", 1))
            .with(WriteOp::delete(a.doc("y")));
        assert_eq!(same.partition().unwrap(), Some("schools/a"));
    }

    #[test]
    fn decode_injects_id_and_encode_strips_it() {
        #[derive(Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Row {
            id: String,
            n: i64,
        }
        let fields = encode(&Row { id: "r1".into(), n: 3 }).unwrap();
        assert!(!fields.contains_key("id"));
        let doc = Document {
            path: CollectionPath::root("rows").doc("r1"),
            fields,
        };
        assert_eq!(doc.decode::<Row>().unwrap(), Row { id: "r1".into(), n: 3 });
    }

    #[test]
    fn server_timestamps_sort_chronologically() {
        let a = DateTime::parse_from_rfc3339("2026-01-01T10:00:00.5Z").unwrap().with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2026-01-01T10:00:01Z").unwrap().with_timezone(&Utc);
        let (sa, sb) = (server_timestamp(a), server_timestamp(b));
        assert_eq!(compare_json(&sa, &sb), Ordering::Less);
        assert_eq!(sa, "2026-01-01T10:00:00.500000Z");
    }

    #[test]
    fn ordering_omits_missing_fields() {
        let q = Query::new().where_eq("classId", "c1").order_by("name", Direction::Ascending);
        let mut f = Fields::new();
        f.insert("classId".into(), "c1".into());
        assert!(!q.matches(&f));
        f.insert("name".into(), "Ada".into());
        assert!(q.matches(&f));
    }
}
