pub mod range_server;

use std::sync::Once;

static LOGS: Once = Once::new();

/// Best-effort tracing output for test debugging (`RUST_LOG=debug`).
pub fn init_logging() {
    LOGS.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
