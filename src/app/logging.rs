//! Logging configuration and initialization

use crate::app::config::AppConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the application. `RUST_LOG`, when set,
/// replaces the filter derived from the verbosity level.
pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(config.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(config.verbose >= 3) // Show line numbers for -vvv
        .with_writer(std::io::stderr)
        .try_init();

    debug!("renovate-playground started with verbosity level: {}", config.verbose);
}

/// Initialize tracing with just a verbosity level
pub fn init_tracing(verbose: u8) {
    let config = AppConfig {
        verbose,
        ..AppConfig::default()
    };
    init_logging(&config);
}
