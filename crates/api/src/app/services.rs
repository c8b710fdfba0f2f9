//! Service wiring: one document store and one identity provider shared by
//! every request, with per-request engines and repositories built on top.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use schoolbank_auth::EffectiveScope;
use schoolbank_core::DomainResult;
use schoolbank_infra::document_store::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore};
use schoolbank_infra::{
    IdentityProvider, InMemoryIdentityProvider, LedgerEngine, ProfileDirectory,
    ProvisioningService, SchoolDirectory, ScopeResolver, TenantRepository,
};

use crate::config::ApiConfig;

pub type SharedStore = Arc<dyn DocumentStore>;
pub type SharedProvider = Arc<dyn IdentityProvider>;

pub struct AppServices {
    store: SharedStore,
    provider: SharedProvider,
}

impl AppServices {
    pub fn new(store: SharedStore, provider: SharedProvider) -> Self {
        Self { store, provider }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryIdentityProvider::new()),
        )
    }

    /// Pick the store from configuration, migrate it, and seed the
    /// superadmin placeholder when one is configured.
    pub async fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        let store: SharedStore = match &config.database_url {
            Some(url) => {
                let store = PostgresDocumentStore::connect(url)
                    .await
                    .context("failed to connect to DATABASE_URL")?;
                store.migrate().await.context("failed to migrate document schema")?;
                info!("using postgres document store");
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set; documents are kept in memory");
                Arc::new(InMemoryDocumentStore::new())
            }
        };
        let services = Self::new(store, Arc::new(InMemoryIdentityProvider::new()));

        if let Some(email) = &config.superadmin_email {
            services
                .profiles()
                .ensure_superadmin(email)
                .await
                .context("failed to seed superadmin profile")?;
        }
        Ok(services)
    }

    pub fn resolver(&self) -> ScopeResolver<SharedStore> {
        ScopeResolver::new(self.store.clone())
    }

    pub fn repo(&self, scope: &EffectiveScope) -> DomainResult<TenantRepository<SharedStore>> {
        TenantRepository::for_scope(self.store.clone(), scope)
    }

    pub fn engine(&self) -> LedgerEngine<SharedStore> {
        LedgerEngine::new(self.store.clone())
    }

    pub fn provisioning(&self) -> ProvisioningService<SharedStore, SharedProvider> {
        ProvisioningService::new(self.store.clone(), self.provider.clone())
    }

    pub fn profiles(&self) -> ProfileDirectory<SharedStore> {
        ProfileDirectory::new(self.store.clone())
    }

    pub fn schools(&self) -> SchoolDirectory<SharedStore> {
        SchoolDirectory::new(self.store.clone())
    }
}
