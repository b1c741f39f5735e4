pub mod fake_api;
pub mod fixtures;

use std::sync::Once;

pub use fake_api::{FakeEventsApi, Gate, Operation};
pub use fixtures::*;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness. Safe to call from every
/// test.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}
