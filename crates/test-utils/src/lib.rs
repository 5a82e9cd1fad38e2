//! Shared doubles and helpers for the buildrelay integration tests.

pub mod builders;
pub mod clients;
pub mod fake_builder;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use buildrelay::logging::{build_filter, LOG_ENV};

pub use builders::{memory_cache, ConfigBuilder};
pub use clients::{FailingClient, RecordingClient};
pub use fake_builder::FakeBuilder;

/// Upper bound for any single wait in a test.
pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a subscriber that writes through the test harness, so output only
/// shows up for failing tests. Honours `BUILDRELAY_LOG` like the binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let env = std::env::var(LOG_ENV).ok();
        let Ok(filter) = build_filter(None, env.as_deref()) else {
            return;
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_DEADLINE`].
pub async fn with_timeout<T>(f: impl Future<Output = T>) -> T {
    match tokio::time::timeout(TEST_DEADLINE, f).await {
        Ok(value) => value,
        Err(_) => panic!("test future still pending after {TEST_DEADLINE:?}"),
    }
}
