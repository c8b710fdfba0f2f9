//! Tenant-scoped and cross-tenant accessors over the document store.
//!
//! [`TenantRepository`] is bound to one resolved school and cannot reach any
//! other. The directories read the non-scoped `users` and `schools`
//! collections; every query there filters by school id explicitly and must be
//! reviewed with cross-tenant leakage in mind.

pub mod directory;
pub mod tenant;

pub use directory::{CascadeReport, ProfileDirectory, SchoolDirectory, SchoolStats};
pub use tenant::{TenantRepository, TenantStats};

use schoolbank_core::{DomainError, Entity};

use crate::document_store::{Document, Fields, StoreError, server_timestamp};

pub(crate) const CREATED_AT: &str = "createdAt";
pub(crate) const UPDATED_AT: &str = "updatedAt";

/// Store errors for a single-entity write, with `NotFound` naming the entity.
pub(crate) fn entity_error<E: Entity>(err: StoreError) -> DomainError {
    match err {
        StoreError::NotFound(_) => DomainError::NotFound(E::KIND),
        other => other.into(),
    }
}

/// Decode a list of documents, failing on the first bad one.
pub(crate) fn decode_all<E: Entity>(docs: &[Document]) -> Result<Vec<E>, DomainError> {
    docs.iter()
        .map(|d| d.decode::<E>().map_err(DomainError::from))
        .collect()
}

/// Fields as they will read back once a stamped write commits.
pub(crate) fn with_stamp(
    mut fields: Fields,
    field: &str,
    at: chrono::DateTime<chrono::Utc>,
) -> Fields {
    fields.insert(field.to_string(), server_timestamp(at));
    fields
}
