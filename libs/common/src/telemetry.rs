//! Tracing bootstrap shared by every binary in the workspace

use tracing_subscriber::{EnvFilter, fmt};

/// Install the global `tracing` subscriber
///
/// The filter comes from `RUST_LOG` and falls back to `info`. Calling this
/// twice is harmless: the second installation attempt is ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
