//! Tracing setup for hosts and tests.

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Returns `false` when a subscriber was already installed or the crate was
/// built without the `tracing` feature.
#[cfg(feature = "tracing")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "tracing"))]
pub fn init_tracing() -> bool {
    false
}
