//! `schoolbank-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how to
//! decide, never how to look anything up.
//!
//! [`session`] is the client-side half of impersonation. The server never
//! reads it; clients keep the context there and send its school id in the
//! `x-impersonate-school` header.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod profile;
pub mod roles;
pub mod scope;
pub mod session;

pub use authorize::{
    AuthzError, authorize, authorize_any, can, can_create, has_permission, require_auth,
};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use principal::Identity;
pub use profile::{Profile, ProfileStatus, is_valid_email, normalize_email};
pub use roles::Role;
pub use scope::{EffectiveScope, ImpersonationContext};
pub use session::{IMPERSONATION_KEY, InMemoryLocalStore, LocalStore, Session};
