//! Entity trait: identity + the collection a stored entity lives in.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::EntityKind;

/// A record persisted as one document.
///
/// The identifier is the document's key, not part of its body; stores inject
/// it under `"id"` when decoding and strip it when encoding.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + AsRef<str> + From<String>;

    /// Collection name, relative to the owning school for tenant data.
    const COLLECTION: &'static str;

    /// Reported by `NotFound` failures for this entity.
    const KIND: EntityKind;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
