//! Process-wide runtime accessors exposed to console and RPC adapters.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Record the process start instant. Later calls are no-ops.
pub fn mark_started() {
    PROCESS_START.get_or_init(Instant::now);
}

/// Time elapsed since [`mark_started`] (or since the first call to this
/// function when the host never marked a start).
pub fn uptime() -> Duration {
    PROCESS_START.get_or_init(Instant::now).elapsed()
}

/// Version of the scheduler runtime.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
