use serde::{Deserialize, Serialize};

use schoolbank_core::UserId;

/// An authenticated login identity, as vouched for by the identity provider.
///
/// Owned by the provider; profiles reference it by id and never embed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
}

impl Identity {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }

    /// Email as profiles store it (trimmed, lowercased).
    pub fn normalized_email(&self) -> String {
        crate::normalize_email(&self.email)
    }
}
