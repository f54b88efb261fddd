//! Tracing subscriber setup for the `usb-stream` binary.
//!
//! `RUST_LOG` wins when set; otherwise the `[logging] level` directive from
//! the configuration is used. Output goes to stderr so that `listen` can
//! stream received bytes on stdout.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the filter from `RUST_LOG`, falling back to `level`.
pub fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_for(&config.level))
        .with_writer(std::io::stderr)
        .with_target(false);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_uses_config_level() {
        std::env::remove_var("RUST_LOG");
        let filter = filter_for("usb_stream=debug");
        assert_eq!(filter.to_string(), "usb_stream=debug");
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        std::env::set_var("RUST_LOG", "warn");
        let filter = filter_for("trace");
        std::env::remove_var("RUST_LOG");
        assert_eq!(filter.to_string(), "warn");
    }
}
