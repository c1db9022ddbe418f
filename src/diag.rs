//! Structured diagnostics for the three passes, driven by `tracing` and
//! filtered by `RUST_LOG` the way the teacher threads `anyhow::Context`
//! through its own pipeline stages — except a library embedded in a host
//! process doesn't own a place to print an error chain, so the equivalent
//! here is spans and events a host can subscribe to.

use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` pretty-printer reading its filter from
/// `RUST_LOG`, defaulting to `info`. Intended for the development CLI; a
/// host embedding this crate as a library is expected to install its own
/// subscriber instead.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Log the sticky-status short-circuit every pass entry point takes once
/// `State::status` has latched a failure.
pub fn trace_short_circuit(pass: &str, status: crate::errors::EncodeError) {
    tracing::trace!(pass, %status, "skipping pass, status already latched");
}
