//! Logging setup for the command line
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Default filter used when RUST_LOG is unset
fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber.
///
/// - If RUST_LOG is set it wins; otherwise a build-dependent default is used.
/// - `quiet` caps the default at warnings.
pub fn setup_logging(quiet: bool) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) if quiet => EnvFilter::new("warn"),
        Err(_) => EnvFilter::new(default_filter()),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);
    // A subscriber may already be installed (tests); keep that one
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();

    tracing::debug!("Logging initialized");
}
