//! Identity-provider boundary.
//!
//! The provider owns login credentials; this side only ever sees
//! `{id, email}`. Credential storage is the provider's concern.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use schoolbank_auth::{Identity, is_valid_email, normalize_email};
use schoolbank_core::{DomainError, UserId};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("an account already exists for '{0}'")]
    EmailAlreadyExists(String),

    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,

    #[error("invalid email address '{0}'")]
    InvalidEmail(String),

    #[error("identity not found: {0}")]
    NotFound(String),

    #[error("identity provider failure: {0}")]
    Provider(String),
}

impl From<IdentityError> for DomainError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::EmailAlreadyExists(_) => DomainError::AlreadyExists(value.to_string()),
            IdentityError::WeakPassword | IdentityError::InvalidEmail(_) => {
                DomainError::InvalidArgument(value.to_string())
            }
            IdentityError::NotFound(_) | IdentityError::Provider(_) => {
                DomainError::Internal(value.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentity {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_identity(&self, new: NewIdentity) -> Result<Identity, IdentityError>;

    /// Fails with `NotFound` when no such identity exists.
    async fn delete_identity(&self, id: &UserId) -> Result<(), IdentityError>;

    async fn list_identities(&self) -> Result<Vec<Identity>, IdentityError>;
}

#[async_trait]
impl<T> IdentityProvider for Arc<T>
where
    T: IdentityProvider + ?Sized,
{
    async fn create_identity(&self, new: NewIdentity) -> Result<Identity, IdentityError> {
        (**self).create_identity(new).await
    }

    async fn delete_identity(&self, id: &UserId) -> Result<(), IdentityError> {
        (**self).delete_identity(id).await
    }

    async fn list_identities(&self) -> Result<Vec<Identity>, IdentityError> {
        (**self).list_identities().await
    }
}

/// In-memory provider for tests/dev: identity id to normalized email.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    accounts: RwLock<BTreeMap<UserId, String>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity directly, bypassing validation.
    pub fn seed(&self, id: UserId, email: &str) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(id, normalize_email(email));
        }
    }

    pub fn contains(&self, id: &UserId) -> bool {
        self.accounts
            .read()
            .map(|accounts| accounts.contains_key(id))
            .unwrap_or(false)
    }

    fn poisoned() -> IdentityError {
        IdentityError::Provider("lock poisoned".to_string())
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_identity(&self, new: NewIdentity) -> Result<Identity, IdentityError> {
        let email = normalize_email(&new.email);
        if !is_valid_email(&email) {
            return Err(IdentityError::InvalidEmail(new.email));
        }
        if new.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword);
        }

        let mut accounts = self.accounts.write().map_err(|_| Self::poisoned())?;
        if accounts.values().any(|existing| *existing == email) {
            return Err(IdentityError::EmailAlreadyExists(email));
        }
        let id = UserId::generate();
        accounts.insert(id.clone(), email.clone());
        Ok(Identity::new(id, email))
    }

    async fn delete_identity(&self, id: &UserId) -> Result<(), IdentityError> {
        let mut accounts = self.accounts.write().map_err(|_| Self::poisoned())?;
        accounts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))
    }

    async fn list_identities(&self) -> Result<Vec<Identity>, IdentityError> {
        let accounts = self.accounts.read().map_err(|_| Self::poisoned())?;
        Ok(accounts
            .iter()
            .map(|(id, email)| Identity::new(id.clone(), email.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use schoolbank_core::ErrorKind;

    use super::*;

    fn new_identity(email: &str, password: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            password: password.to_string(),
            display_name: "Someone".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let provider = InMemoryIdentityProvider::new();
        provider
            .create_identity(new_identity("Maria@School.it", "secret1"))
            .await
            .unwrap();
        let err = provider
            .create_identity(new_identity(" maria@school.it", "secret2"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::EmailAlreadyExists(_)));
        assert_eq!(DomainError::from(err).kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn weak_password_and_bad_email_are_invalid_arguments() {
        let provider = InMemoryIdentityProvider::new();
        let err = provider.create_identity(new_identity("a@b.it", "12345")).await.unwrap_err();
        assert_eq!(err, IdentityError::WeakPassword);
        let err = provider.create_identity(new_identity("not-an-email", "123456")).await.unwrap_err();
        assert_eq!(DomainError::from(err).kind(), ErrorKind::InvalidArgument);
        assert!(provider.list_identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_missing_identity() {
        let provider = InMemoryIdentityProvider::new();
        let identity = provider.create_identity(new_identity("a@b.it", "123456")).await.unwrap();
        provider.delete_identity(&identity.id).await.unwrap();
        assert!(!provider.contains(&identity.id));
        let err = provider.delete_identity(&identity.id).await.unwrap_err();
        assert!(matches!(err, IdentityError::NotFound(_)));
    }
}
