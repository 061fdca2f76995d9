//! Shared test helpers, reused across integration test binaries (teacher
//! precedent: a `tests/common` module rather than duplicating setup).

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes a `tracing` subscriber once per test binary so `tracing::*`
/// calls made inside the crate (e.g. the double-resume or panic-capture
/// diagnostics) surface on the test's stderr instead of being silently
/// swallowed when a test fails.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
