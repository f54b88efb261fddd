//! Port-specific error types.
//!
//! Open-time failures map onto [`OpenStatus`](super::OpenStatus) codes; transfer-time
//! failures are returned by the `try_*` methods of
//! [`PortTransport`](super::PortTransport) and recorded in its `last_error` slot by the
//! compatibility methods.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The device is missing or already owned by someone else.
    #[error("Serial device unavailable: {path}: {reason}")]
    DeviceUnavailable { path: String, reason: String },

    /// The driver refused the requested line settings.
    #[error("Configuration rejected for {path}: {reason}")]
    ConfigurationRejected { path: String, reason: String },

    /// No data arrived within the bound.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The transport reported an unrecoverable error during a transfer.
    #[error("I/O fault: {0}")]
    IoFault(String),

    /// Attempted to use a port that's not open.
    #[error("Port is not open")]
    NotOpen,

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a DeviceUnavailable error for a device path.
    pub fn unavailable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a ConfigurationRejected error for a device path.
    pub fn rejected(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationRejected {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an IoFault error from a message.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::IoFault(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// True for errors that mean "nothing arrived in time" rather than a fault.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// True for errors that mean the device has not finished the operation yet
    /// and it may be re-issued.
    pub fn is_incomplete(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}
