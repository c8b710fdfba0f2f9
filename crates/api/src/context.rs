//! Per-request context.
//!
//! The authenticated caller travels as an [`EffectiveScope`] request
//! extension, re-derived from the profile store on every request. Clients
//! ask for impersonation with a header naming the school; whether it is
//! honoured is decided server-side.

use axum::http::HeaderMap;

use schoolbank_core::{DomainError, DomainResult, SchoolId};

pub use schoolbank_auth::EffectiveScope;

/// Header carrying the school a superadmin wants to act in.
pub const IMPERSONATE_HEADER: &str = "x-impersonate-school";

/// The school requested through [`IMPERSONATE_HEADER`], if any.
pub fn impersonation_target(headers: &HeaderMap) -> DomainResult<Option<SchoolId>> {
    let Some(value) = headers.get(IMPERSONATE_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| DomainError::invalid_argument("impersonation header is not valid text"))?
        .trim();
    if value.is_empty() {
        return Ok(None);
    }
    value.parse::<SchoolId>().map(Some)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn header_is_optional_and_trimmed() {
        let mut headers = HeaderMap::new();
        assert_eq!(impersonation_target(&headers).unwrap(), None);

        headers.insert(IMPERSONATE_HEADER, HeaderValue::from_static(" school-a "));
        assert_eq!(impersonation_target(&headers).unwrap(), Some(SchoolId::new("school-a")));

        headers.insert(IMPERSONATE_HEADER, HeaderValue::from_static("a/b"));
        assert!(impersonation_target(&headers).is_err());
    }
}
