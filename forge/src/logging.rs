//! Development-time tracing for debugging the pipeline.
//!
//! Diagnostics go to stderr and are controlled via `RUST_LOG`; stdout is
//! reserved for command output (`forge process` prints its regeneration
//! count there).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=forge=debug forge process --lang english --turn 2 ...
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
