//! Log output for hosts that do not install their own subscriber.
//!
//! Engine events are emitted through `tracing` when the `tracing` feature is
//! enabled; without it the calls here are no-ops.

/// Install a formatting subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (for example `"modelspace_eval=debug"`).
///
/// Returns `false` when a global subscriber was already installed.
#[cfg(feature = "tracing")]
pub fn init_tracing(default_filter: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "tracing"))]
pub fn init_tracing(_default_filter: &str) -> bool {
    false
}

/// Whether engine events are compiled in.
pub const fn enabled() -> bool {
    cfg!(feature = "tracing")
}
