//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are opaque strings: the document store (or the identity
//! provider, for `UserId`) assigns them, and nothing may depend on their shape.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a school (the tenant boundary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchoolId(String);

/// Identifier of a login identity and of the profile keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

/// Identifier of a ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuickRewardId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardRequestId(String);

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Generate a fresh identifier.
            ///
            /// Uses a UUIDv7 (time-ordered) rendered without hyphens. Prefer
            /// passing IDs explicitly in tests for determinism.
            pub fn generate() -> Self {
                Self(Uuid::now_v7().simple().to_string())
            }

            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed.contains('/') {
                    return Err(DomainError::invalid_argument(format!(
                        "{}: '{}' is not a valid identifier",
                        $name, s
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

impl_string_newtype!(SchoolId, "SchoolId");
impl_string_newtype!(UserId, "UserId");
impl_string_newtype!(StudentId, "StudentId");
impl_string_newtype!(ClassId, "ClassId");
impl_string_newtype!(SubjectId, "SubjectId");
impl_string_newtype!(TransactionId, "TransactionId");
impl_string_newtype!(RewardId, "RewardId");
impl_string_newtype!(QuickRewardId, "QuickRewardId");
impl_string_newtype!(RewardRequestId, "RewardRequestId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_path_safe() {
        let a = StudentId::generate();
        let b = StudentId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().contains('/'));
        assert!(!a.as_str().contains('-'));
    }

    #[test]
    fn parsing_rejects_empty_and_slashes() {
        assert!("".parse::<SchoolId>().is_err());
        assert!("   ".parse::<SchoolId>().is_err());
        assert!("a/b".parse::<SchoolId>().is_err());
        assert_eq!(" abc ".parse::<SchoolId>().unwrap().as_str(), "abc");
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = RewardId::new("r1");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("r1"));
    }
}
