pub mod builders;
pub mod fake_operator;

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{NodeConfigBuilder, WorkflowBuilder, node_with_id};
pub use fake_operator::{CountingOperator, FailingOperator, HookLog};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Logs are captured per test and only shown for failures (or with
/// `--nocapture`). Enable levels with e.g. `RUST_LOG=awel=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
