//! Tracing initialization for the binary.

use tracing_subscriber::EnvFilter;

/// Install a formatted stderr subscriber filtered by `RUST_LOG`.
///
/// `verbose` raises the crate's own level to `debug` when `RUST_LOG` is unset.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(verbose: bool) {
    let default_directive = if verbose { "info,tallycalc=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
