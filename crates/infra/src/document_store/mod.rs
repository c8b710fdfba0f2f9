//! Document store boundary.
//!
//! Tenant-partitioned collections with equality-filtered ordered queries,
//! point reads, single-partition atomic write batches and relative integer
//! increments. There are no cross-partition transactions.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use r#trait::{
    CollectionPath, CommitResult, Direction, DocPath, Document, DocumentStore, Fields,
    Precondition, Query, StoreError, WriteBatch, WriteOp, encode, server_timestamp,
};
