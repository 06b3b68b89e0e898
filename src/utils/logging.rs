//! Logging setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a console subscriber
///
/// `RUST_LOG` takes precedence over `level` when it is set. Installing a
/// second subscriber is a no-op.
pub fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .try_init()
        .ok();
}

/// Level name for a `-v` count on top of a base level
pub fn verbosity_level(base: &str, verbose: u8) -> String {
    match verbose {
        0 => base.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}
