//! Observability infrastructure: tracing and metrics.
//!
//! The CLI calls [`init`] once at startup. Library code only emits `tracing`
//! events and `metrics` samples; both are no-ops until a subscriber or recorder
//! is installed.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Build the log filter.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` selects `debug` and the
/// configured level is used for everything else.
pub fn filter(level: &str, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose { "debug" } else { level };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber and register metric descriptions.
///
/// Returns an error if a global subscriber is already installed.
pub fn init(level: &str, verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(filter(level, verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .try_init()?;

    metrics::register_core_metrics();
    tracing::debug!(level, verbose, "Observability initialized");
    Ok(())
}
