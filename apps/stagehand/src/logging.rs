//! Tracing setup.
//!
//! Logs go to stderr so stdout only carries command results (text or JSON).

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
///
/// A second call is a no-op, which keeps tests that run `main`-like paths
/// in one process safe.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "stagehand=debug,stagehand_core=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
