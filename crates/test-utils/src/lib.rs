pub mod builders;
pub mod fake_dispatcher;

use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    with_deadline(Duration::from_secs(5), f).await
}

/// Run a future with a custom timeout; tests that spawn processes need
/// more room than in-memory ones.
pub async fn with_deadline<F, T>(limit: Duration, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(limit, f)
        .await
        .unwrap_or_else(|_| panic!("Test timed out after {limit:?}"))
}
