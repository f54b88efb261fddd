//! Configuration schema definitions.
//!
//! This module defines the structure of `usb-stream.toml` using serde.
//! Every section has defaults, so an empty file is a valid configuration.

use crate::port::{PortSettings, RetryPolicy, Timeouts};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port selection and line settings
    pub port: PortSection,
    /// Timeout policy in milliseconds
    pub timeouts: Timeouts,
    /// Event-driven write retry policy
    pub retry: RetrySection,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Port section. Line settings are the integer codes accepted by
/// `configure_port`; unrecognised codes fall back rather than fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSection {
    /// Device suffix ("0", "3") or full path
    pub device: Option<String>,
    /// Use the event-driven transport instead of the blocking one
    pub event_driven: bool,
    pub baud_rate: i64,
    /// Character size: 5, 6, 7 or 8
    pub char_size: i64,
    /// 0 = none, 1 = odd, 2 = even
    pub parity: i64,
    /// 1 or 2
    pub stop_bits: i64,
    /// 0 = none, 1 = software, 2 = hardware
    pub flow_control: i64,
}

impl Default for PortSection {
    fn default() -> Self {
        Self {
            device: None,
            event_driven: false,
            baud_rate: 115_200,
            char_size: 8,
            parity: 0,
            stop_bits: 1,
            flow_control: 0,
        }
    }
}

impl PortSection {
    /// Line settings after fallback mapping.
    pub fn settings(&self) -> PortSettings {
        PortSettings::from_codes(
            self.baud_rate,
            self.char_size,
            self.parity,
            self.stop_bits,
            self.flow_control,
        )
    }
}

/// Retry section for event-driven writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Attempts per byte, including the first
    pub max_attempts: u32,
    /// First back-off pause in microseconds
    pub initial_backoff_us: u64,
    /// Largest back-off pause in microseconds
    pub max_backoff_us: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_us: policy.initial_backoff.as_micros() as u64,
            max_backoff_us: policy.max_backoff.as_micros() as u64,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_micros(self.initial_backoff_us),
            max_backoff: Duration::from_micros(self.max_backoff_us),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset: "trace", "debug", "info", ...
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    #[default]
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}
