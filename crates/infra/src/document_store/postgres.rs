//! Postgres-backed document store.
//!
//! Every document is one row of the `documents` table with a JSONB body. A
//! write batch runs inside one SQL transaction, so partition-scoped atomicity
//! is enforced by the store rather than by callers.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Unavailable` |
//! | Database (numeric value out of range) | `22003` | `OutOfRange` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use super::r#trait::{
    CollectionPath, CommitResult, Direction, DocPath, Document, DocumentStore, Fields, Query,
    StoreError, WriteBatch, WriteOp, server_timestamp,
};

const SCHEMA: &str = include_str!("../../migrations/0001_documents.sql");

/// Postgres-backed document store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

fn body_fields(path: &DocPath, body: JsonValue) -> Result<Fields, StoreError> {
    match body {
        JsonValue::Object(fields) => Ok(fields),
        other => Err(StoreError::Decode(format!(
            "{path}: body is not an object ({other})"
        ))),
    }
}

async fn current_body(
    tx: &mut Transaction<'_, Postgres>,
    path: &DocPath,
) -> Result<Option<Fields>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT body
        FROM documents
        WHERE collection = $1 AND id = $2
        FOR UPDATE
        "#,
    )
    .bind(path.collection().as_str())
    .bind(path.id())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_document", e))?;

    match row {
        Some(row) => {
            let body: JsonValue = row
                .try_get("body")
                .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
            Ok(Some(body_fields(path, body)?))
        }
        None => Ok(None),
    }
}

async fn apply(
    tx: &mut Transaction<'_, Postgres>,
    op: WriteOp,
    result: &mut CommitResult,
) -> Result<(), StoreError> {
    let stamp_value = server_timestamp(result.commit_time);
    let stamped = |mut fields: Fields, stamp: Option<String>| {
        if let Some(field) = stamp {
            fields.insert(field, stamp_value.clone());
        }
        JsonValue::Object(fields)
    };

    match op {
        WriteOp::Create {
            path,
            fields,
            stamp,
        } => {
            sqlx::query(
                r#"
                INSERT INTO documents (collection, id, partition_key, body)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(path.collection().as_str())
            .bind(path.id())
            .bind(path.partition())
            .bind(stamped(fields, stamp))
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::AlreadyExists(path.to_string())
                } else {
                    map_sqlx_error("create_document", e)
                }
            })?;
        }
        WriteOp::Set {
            path,
            fields,
            stamp,
        } => {
            sqlx::query(
                r#"
                INSERT INTO documents (collection, id, partition_key, body)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (collection, id)
                DO UPDATE SET
                    body = EXCLUDED.body,
                    written_at = NOW()
                "#,
            )
            .bind(path.collection().as_str())
            .bind(path.id())
            .bind(path.partition())
            .bind(stamped(fields, stamp))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("set_document", e))?;
        }
        WriteOp::Update {
            path,
            fields,
            stamp,
            precondition,
        } => {
            let current = current_body(tx, &path)
                .await?
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            if let Some(pre) = &precondition {
                if !pre.holds(&current) {
                    return Err(StoreError::PreconditionFailed(format!(
                        "{path}: expected {} == {}",
                        pre.field, pre.equals
                    )));
                }
            }
            sqlx::query(
                r#"
                UPDATE documents
                SET body = body || $3::jsonb, written_at = NOW()
                WHERE collection = $1 AND id = $2
                "#,
            )
            .bind(path.collection().as_str())
            .bind(path.id())
            .bind(stamped(fields, stamp))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_document", e))?;
        }
        WriteOp::Increment { path, field, delta } => {
            let row = sqlx::query(
                r#"
                UPDATE documents
                SET body = jsonb_set(
                        body,
                        ARRAY[$3::text],
                        to_jsonb(COALESCE((body ->> $3::text)::bigint, 0) + $4::bigint)
                    ),
                    written_at = NOW()
                WHERE collection = $1 AND id = $2
                RETURNING (body ->> $3::text)::bigint AS value
                "#,
            )
            .bind(path.collection().as_str())
            .bind(path.id())
            .bind(field.as_str())
            .bind(delta)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("increment_field", e))?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

            let value: i64 = row
                .try_get("value")
                .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
            result.record_increment(path, field, value);
        }
        WriteOp::Delete { path } => {
            sqlx::query(
                r#"
                DELETE FROM documents
                WHERE collection = $1 AND id = $2
                "#,
            )
            .bind(path.collection().as_str())
            .bind(path.id())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_document", e))?;
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self), fields(path = %path), err)]
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT body
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(path.collection().as_str())
        .bind(path.id())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_document", e))?;

        match row {
            Some(row) => {
                let body: JsonValue = row
                    .try_get("body")
                    .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
                Ok(Some(Document {
                    path: path.clone(),
                    fields: body_fields(path, body)?,
                }))
            }
            None => Ok(None),
        }
    }

    #[instrument(
        skip(self, query),
        fields(collection = %collection, document_count = tracing::field::Empty),
        err
    )]
    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let containment: Fields = query.filters.iter().cloned().collect();
        let (order_field, ascending) = match &query.order_by {
            Some((field, direction)) => (Some(field.as_str()), *direction == Direction::Ascending),
            None => (None, true),
        };
        let limit = query.limit.map(|l| l as i64);

        let rows = sqlx::query(
            r#"
            SELECT id, body
            FROM documents
            WHERE collection = $1
                AND body @> $2::jsonb
                AND ($3::text IS NULL OR COALESCE(jsonb_typeof(body -> $3::text), 'null') <> 'null')
            ORDER BY
                CASE WHEN $4::boolean THEN body -> $3::text END ASC,
                CASE WHEN NOT $4::boolean THEN body -> $3::text END DESC,
                id ASC
            LIMIT $5::bigint
            "#,
        )
        .bind(collection.as_str())
        .bind(JsonValue::Object(containment))
        .bind(order_field)
        .bind(ascending)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_documents", e))?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| StoreError::Decode(format!("{collection}: {e}")))?;
            let body: JsonValue = row
                .try_get("body")
                .map_err(|e| StoreError::Decode(format!("{collection}/{id}: {e}")))?;
            let path = collection.doc(&id);
            let fields = body_fields(&path, body)?;
            docs.push(Document { path, fields });
        }

        Span::current().record("document_count", docs.len());
        Ok(docs)
    }

    #[instrument(skip(self, batch), fields(op_count = batch.len()), err)]
    async fn commit(&self, batch: WriteBatch) -> Result<CommitResult, StoreError> {
        batch.partition()?;
        let mut result = CommitResult::new(Utc::now());
        if batch.is_empty() {
            return Ok(result);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for op in batch.into_ops() {
            if let Err(err) = apply(&mut tx, op, &mut result).await {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(err);
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(result)
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(msg),
                Some("40001") | Some("40P01") => StoreError::Unavailable(msg),
                Some("22003") => StoreError::OutOfRange(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
