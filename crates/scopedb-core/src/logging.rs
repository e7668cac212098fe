//! Tracing setup for test binaries.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber that writes through the test harness.
///
/// Filtering follows `RUST_LOG`, defaulting to `warn` so leaked-session
/// warnings show up in failing test output. Safe to call from every test;
/// only the first call installs the subscriber.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::warn!("still logging after a second init");
    }
}
