//! Structured logging setup, grounded on the teacher's use of `tracing` +
//! `tracing-subscriber` throughout `network/`.
//!
//! `LOG_FORMAT=json` selects machine-readable output (for shipping to a
//! log aggregator); anything else (including unset) selects the
//! human-readable compact format used during local development.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initializes the global `tracing` subscriber from `RUST_LOG`/`LOG_FORMAT`.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}
