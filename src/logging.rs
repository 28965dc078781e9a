//! Ambient logging setup: `tracing`/`tracing-subscriber` wiring for the
//! CLI binary. Library code only emits spans/events; it never installs a
//! subscriber itself.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `tracing` subscriber reading level filters from `RUST_LOG`
/// (falling back to `info`). Call once, from the CLI entry point.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
