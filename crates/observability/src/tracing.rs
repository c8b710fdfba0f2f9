//! Tracing/logging initialization.
//!
//! JSON lines with timestamps, filtered by `RUST_LOG`. Ledger audit records
//! are emitted under [`AUDIT_TARGET`] and are kept at `info` unless the
//! filter says otherwise, so targets are included in the output.

use tracing_subscriber::EnvFilter;

/// Target of the ledger audit trail.
pub const AUDIT_TARGET: &str = "schoolbank::audit";

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info,schoolbank::audit=info,sqlx=warn";

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from(directives.as_deref()))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .try_init();
}
