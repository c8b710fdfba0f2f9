//! Infrastructure layer: document store adapters, tenant scoping, the ledger
//! engine and staff provisioning.

pub mod document_store;
pub mod ledger_engine;
pub mod provisioning;
pub mod repository;
pub mod resolver;

#[cfg(test)]
mod test_support;

pub use ledger_engine::{
    Approval, ClassAwardFailure, ClassAwardReport, GiveResult, LedgerEngine, Reversal,
};
pub use provisioning::{
    IdentityError, IdentityProvider, InMemoryIdentityProvider, NewIdentity, NewStaffMember,
    Provisioned, ProvisioningService,
};
pub use repository::{
    CascadeReport, ProfileDirectory, SchoolDirectory, SchoolStats, TenantRepository, TenantStats,
};
pub use resolver::ScopeResolver;
