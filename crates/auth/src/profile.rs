//! Staff profile records (`users/{id}`).
//!
//! # Invariants
//! - Exactly one non-deleted profile per (lowercased) email.
//! - `school_id` is `None` only for superadmins.
//! - The role is immutable after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schoolbank_core::{ClassId, Entity, EntityKind, SchoolId, UserId};

use crate::Role;

/// Profile lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    #[default]
    Active,
    /// Pre-created by an admin; waiting for its identity's first login.
    Pending,
}

impl core::fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProfileStatus::Active => f.write_str("active"),
            ProfileStatus::Pending => f.write_str("pending"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub school_id: Option<SchoolId>,
    /// Classes a teacher is assigned to; empty for every other role.
    #[serde(default)]
    pub classes: Vec<ClassId>,
    #[serde(default)]
    pub status: ProfileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(
        id: UserId,
        email: &str,
        name: impl Into<String>,
        role: Role,
        school_id: Option<SchoolId>,
    ) -> Self {
        Self {
            id,
            email: normalize_email(email),
            name: name.into(),
            role,
            school_id,
            classes: Vec::new(),
            status: ProfileStatus::Active,
            created_at: None,
            created_by: None,
            linked_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProfileStatus::Pending
    }

    pub fn belongs_to(&self, school_id: &SchoolId) -> bool {
        self.school_id.as_ref() == Some(school_id)
    }
}

impl Entity for Profile {
    type Id = UserId;

    const COLLECTION: &'static str = "users";
    const KIND: EntityKind = EntityKind::Profile;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Canonical form of an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shape check for an email address: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
