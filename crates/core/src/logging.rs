//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global tracing subscriber.
///
/// Filtering comes from `RUST_LOG` when set; the default keeps the
/// workspace's own crates at debug and everything else at info. Call once,
/// before any other initialization.
///
/// # Example
/// ```
/// carousel_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,carousel=debug"));

    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
