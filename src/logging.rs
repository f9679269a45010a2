//! Diagnostics setup.
//!
//! Everything goes to stderr so graph and text output on stdout stay clean.
//! `RUST_LOG` takes precedence over the configured level.

use crate::infrastructure::config::LoggingConfig;
use std::sync::Once;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Filter directive for the configured level raised by `-v` repetitions.
///
/// `-v` never lowers a more verbose configured level. A configured directive
/// with per-target parts is kept and the `-v` level becomes its default.
pub fn level_directive(config: &LoggingConfig, verbosity: u8) -> String {
    let requested = match verbosity {
        0 => return config.level.clone(),
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    match config.level.trim().parse::<LevelFilter>() {
        Ok(configured) => configured.max(requested).to_string().to_lowercase(),
        Err(_) => format!("{},{}", config.level, requested.to_string().to_lowercase()),
    }
}

/// Install the global subscriber. Only the first call has an effect.
pub fn init(config: &LoggingConfig, verbosity: u8) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(level_directive(config, verbosity))
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .init();
    });
}
