//! Start-up configuration, read once from the environment.

use std::net::SocketAddr;

use anyhow::Context;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// HS256 secret shared with the token issuer.
    pub jwt_secret: String,
    pub bind: SocketAddr,
    /// Postgres document store when set; in-memory otherwise.
    pub database_url: Option<String>,
    /// Email that receives a superadmin placeholder profile at start-up.
    pub superadmin_email: Option<String>,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });
        let bind = get("SCHOOLBANK_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind
            .parse()
            .with_context(|| format!("SCHOOLBANK_BIND is not a socket address: {bind}"))?;

        Ok(Self {
            jwt_secret,
            bind,
            database_url: get("DATABASE_URL"),
            superadmin_email: get("SCHOOLBANK_SUPERADMIN_EMAIL"),
        })
    }

    /// In-memory configuration with the given secret, for tests and demos.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            bind: ([127, 0, 0, 1], 0).into(),
            database_url: None,
            superadmin_email: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ApiConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap();
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("SCHOOLBANK_BIND", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/schoolbank"),
            ("SCHOOLBANK_SUPERADMIN_EMAIL", "root@school.test"),
        ]))
        .unwrap();
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/schoolbank"));
        assert_eq!(config.superadmin_email.as_deref(), Some("root@school.test"));
    }

    #[test]
    fn malformed_bind_address_is_an_error() {
        assert!(ApiConfig::from_lookup(lookup(&[("SCHOOLBANK_BIND", "nowhere")])).is_err());
    }
}
