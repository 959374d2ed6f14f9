//! Logging Setup
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` overrides the
//! default filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const DEFAULT_FILTER: &str = "pitwall=info";

pub fn init_telemetry(verbose: bool) {
    let default = if verbose { "pitwall=debug" } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests, embedding binaries) keeps the first subscriber
    let _ = Registry::default()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
