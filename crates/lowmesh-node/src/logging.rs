//! Tracing subscriber setup.
//!
//! Level conventions across the stack:
//! - ERROR: protocol violations that abort a context or handshake, fatal configuration
//! - WARN: link failures that exhausted a local retry, admission rejections
//! - INFO: neighbor authenticated or removed, route unreachable or restored, band changes
//! - DEBUG: state machine transitions
//! - TRACE: wire-level bytes

use tracing_subscriber::EnvFilter;

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Human-readable output. `RUST_LOG` wins over `default_level`.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt().with_env_filter(filter(default_level)).init();
}

/// JSON output, one object per line.
pub fn init_json(default_level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_level))
        .init();
}

/// Test subscriber; safe to call from every test.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
