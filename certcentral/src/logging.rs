//! Structured logging setup: one daemon-wide `tracing`
//! stream, not ferron's per-virtual-host access logger
//! (that exists to route *HTTP access logs* per vhost, a concern this
//! engine, which serves no HTTP traffic of its own, does not have).
//!
//! Every log line carries `record_name`/`state` via `tracing`'s span
//! fields at the call site in [`certcentral_core::scheduler`]; this module
//! only wires up the subscriber. Error detail is logged through each
//! error's `Display` impl, which never interpolates account keys or
//! challenge key-authorizations.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber. `json` selects structured
/// JSON output (for log aggregation); otherwise a human-readable compact
/// format is used.
///
/// The filter defaults to `info` and honors `RUST_LOG` if set, the usual
/// `tracing-subscriber::EnvFilter` convention.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt().with_env_filter(filter).json().with_current_span(true).with_target(true).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}
