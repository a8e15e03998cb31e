//! Process-wide `tracing` setup for hosts embedding this crate.
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize the global `tracing` subscriber.
///
/// Reads `FNBROKER_LOG`, falling back to `RUST_LOG`, falling back to `info`
/// (or `debug` when `verbose` is set and neither env var is present).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(verbose: bool) {
    let filter = std::env::var("FNBROKER_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map_or_else(
            |_| {
                if verbose {
                    EnvFilter::new("debug")
                } else {
                    EnvFilter::new("info")
                }
            },
            |value| EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set global default tracing subscriber: {}", err);
    }
}
