//! Logging and tracing initialization.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Build the filter: `RUST_LOG` wins, otherwise the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber.
///
/// Logs go to stderr so analysis output on stdout stays machine-readable.
///
/// Returns `false` if a subscriber was already installed (e.g. by an
/// embedding application); the existing one is left in place.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = env_filter(&config.level);

    let installed = if config.json {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };
    installed.is_ok()
}

/// Initialize logging with defaults (useful for quick scripts).
pub fn init_default_logging() -> bool {
    init_logging(&LoggingConfig::default())
}

/// Route logs through the test harness's captured output.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_logging() {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
