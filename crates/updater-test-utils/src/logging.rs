//! Tracing output for tests
//!
//! Honours `RUST_LOG`; defaults to warnings only so passing runs stay quiet.

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber once per process. Later calls are
/// no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
