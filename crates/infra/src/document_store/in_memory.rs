use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;

use super::r#trait::{
    CollectionPath, CommitResult, Direction, DocPath, Document, DocumentStore, Fields, Query,
    StoreError, WriteBatch, WriteOp, compare_json, server_timestamp,
};

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<CollectionPath, BTreeMap<String, Fields>>,
    last_commit: Option<DateTime<Utc>>,
}

impl State {
    fn lookup(&self, path: &DocPath) -> Option<&Fields> {
        self.collections.get(path.collection())?.get(path.id())
    }

    /// Commit times strictly increase, even within one clock tick.
    fn next_commit_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_commit {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_commit = Some(at);
        at
    }
}

/// In-memory document store.
///
/// Intended for tests/dev. Supports deterministic fault injection: every
/// commit touching a poisoned document fails with `Unavailable` and writes
/// nothing.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<State>,
    faults: RwLock<HashSet<DocPath>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commits_touching(&self, path: DocPath) {
        if let Ok(mut faults) = self.faults.write() {
            faults.insert(path);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.write() {
            faults.clear();
        }
    }

    fn check_faults(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let faults = self
            .faults
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        match batch.ops().iter().find(|op| faults.contains(op.path())) {
            Some(op) => Err(StoreError::Unavailable(format!(
                "injected fault on {}",
                op.path()
            ))),
            None => Ok(()),
        }
    }
}

/// Writes staged on top of the committed state until the batch succeeds.
struct Staged<'a> {
    base: &'a State,
    overlay: BTreeMap<DocPath, Option<Fields>>,
}

impl Staged<'_> {
    fn current(&self, path: &DocPath) -> Option<Fields> {
        match self.overlay.get(path) {
            Some(staged) => staged.clone(),
            None => self.base.lookup(path).cloned(),
        }
    }

    fn put(&mut self, path: DocPath, fields: Option<Fields>) {
        self.overlay.insert(path, fields);
    }
}

fn with_stamp(mut fields: Fields, stamp: &Option<String>, at: DateTime<Utc>) -> Fields {
    if let Some(field) = stamp {
        fields.insert(field.clone(), server_timestamp(at));
    }
    fields
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(state.lookup(path).map(|fields| Document {
            path: path.clone(),
            fields: fields.clone(),
        }))
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let Some(docs) = state.collections.get(collection) else {
            return Ok(vec![]);
        };

        let order_field = query.order_by.as_ref().map(|(field, _)| field.as_str());
        let mut found: Vec<Document> = docs
            .iter()
            .filter(|(_, fields)| query.matches(fields))
            // Ordered queries only see documents that carry the order field.
            .filter(|(_, fields)| {
                order_field.is_none_or(|field| !fields.get(field).unwrap_or(&JsonValue::Null).is_null())
            })
            .map(|(id, fields)| Document {
                path: collection.doc(id),
                fields: fields.clone(),
            })
            .collect();

        // BTreeMap iteration is already id-ordered; the stable sort keeps that as the tiebreak.
        if let Some((field, direction)) = &query.order_by {
            found.sort_by(|a, b| {
                let ord = compare_json(
                    a.fields.get(field).unwrap_or(&JsonValue::Null),
                    b.fields.get(field).unwrap_or(&JsonValue::Null),
                );
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitResult, StoreError> {
        batch.partition()?;
        self.check_faults(&batch)?;

        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let at = state.next_commit_time();
        let mut result = CommitResult::new(at);

        let overlay = {
            let mut staged = Staged {
                base: &*state,
                overlay: BTreeMap::new(),
            };
            for op in batch.into_ops() {
                match op {
                    WriteOp::Create {
                        path,
                        fields,
                        stamp,
                    } => {
                        if staged.current(&path).is_some() {
                            return Err(StoreError::AlreadyExists(path.to_string()));
                        }
                        staged.put(path, Some(with_stamp(fields, &stamp, at)));
                    }
                    WriteOp::Set {
                        path,
                        fields,
                        stamp,
                    } => staged.put(path, Some(with_stamp(fields, &stamp, at))),
                    WriteOp::Update {
                        path,
                        fields,
                        stamp,
                        precondition,
                    } => {
                        let mut current = staged
                            .current(&path)
                            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                        if let Some(pre) = &precondition {
                            if !pre.holds(&current) {
                                return Err(StoreError::PreconditionFailed(format!(
                                    "{path}: expected {} == {}",
                                    pre.field, pre.equals
                                )));
                            }
                        }
                        current.extend(with_stamp(fields, &stamp, at));
                        staged.put(path, Some(current));
                    }
                    WriteOp::Increment { path, field, delta } => {
                        let mut current = staged
                            .current(&path)
                            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                        let existing = match current.get(&field) {
                            None | Some(JsonValue::Null) => 0,
                            Some(v) => v.as_i64().ok_or_else(|| {
                                StoreError::Backend(format!("{path}: field '{field}' is not an integer"))
                            })?,
                        };
                        let value = existing.checked_add(delta).ok_or_else(|| {
                            StoreError::OutOfRange(format!("{path}: field '{field}' overflowed"))
                        })?;
                        current.insert(field.clone(), value.into());
                        result.record_increment(path.clone(), field, value);
                        staged.put(path, Some(current));
                    }
                    WriteOp::Delete { path } => staged.put(path, None),
                }
            }
            staged.overlay
        };

        for (path, fields) in overlay {
            match fields {
                Some(fields) => {
                    state
                        .collections
                        .entry(path.collection().clone())
                        .or_default()
                        .insert(path.id().to_string(), fields);
                }
                None => {
                    if let Some(docs) = state.collections.get_mut(path.collection()) {
                        docs.remove(path.id());
                    }
                }
            }
        }

        Ok(result)
    }
}
