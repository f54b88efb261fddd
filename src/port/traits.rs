//! Core traits for the port abstraction.
//!
//! Two seams meet here:
//!
//! - [`SerialDevice`] / [`DeviceOpener`] hide the OS device, so the real
//!   `serialport` backend and the in-memory loopback are interchangeable.
//! - [`Transport`] is the transfer strategy. [`BlockingTransport`] and
//!   [`EventDrivenTransport`] implement the two native I/O models behind one
//!   contract.
//!
//! [`BlockingTransport`]: super::BlockingTransport
//! [`EventDrivenTransport`]: super::EventDrivenTransport

use super::error::PortError;
use super::event_driven::CompletionEvent;
use super::settings::{PortSettings, Timeouts};
use std::sync::Arc;
use std::time::Duration;

/// Which buffered bytes a purge discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purge {
    Input,
    Output,
    All,
}

impl From<Purge> for serialport::ClearBuffer {
    fn from(purge: Purge) -> Self {
        match purge {
            Purge::Input => serialport::ClearBuffer::Input,
            Purge::Output => serialport::ClearBuffer::Output,
            Purge::All => serialport::ClearBuffer::All,
        }
    }
}

/// Transfer direction, used to track in-flight operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// The transfer model a [`PortTransport`](super::PortTransport) was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Calls block until data or buffer space is available, bounded by the
    /// timeout policy.
    #[default]
    Blocking,
    /// Operations are issued without waiting and signal a completion event.
    EventDriven,
}

impl TransportMode {
    /// `true` selects [`TransportMode::EventDriven`].
    pub fn from_flag(use_event_driven: bool) -> Self {
        if use_event_driven {
            Self::EventDriven
        } else {
            Self::Blocking
        }
    }
}

/// An acquired serial device.
///
/// Implementations own the OS resource; dropping the device releases it.
pub trait SerialDevice: Send + std::fmt::Debug {
    /// The path the device was opened with.
    fn name(&self) -> &str;

    /// Write bytes, returning how many the device accepted.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read into `buffer`, waiting at most the current timeout for the first byte.
    ///
    /// Returns a timeout-classified error when nothing arrives.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Current read/write timeout.
    fn timeout(&self) -> Duration;

    /// Apply line settings to the live device.
    fn apply_settings(&mut self, settings: &PortSettings) -> Result<(), PortError>;

    /// Bytes waiting in the driver's input queue.
    fn bytes_to_read(&self) -> Result<usize, PortError>;

    /// Discard buffered bytes.
    fn clear_buffers(&mut self, purge: Purge) -> Result<(), PortError>;

    /// Set `event` whenever new bytes reach the input queue, until the device
    /// is dropped.
    fn notify_on_receive(&mut self, event: Arc<CompletionEvent>) -> Result<(), PortError>;

    /// Like [`read_bytes`](Self::read_bytes), but a timeout is `Ok(0)`.
    fn read_some(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        match self.read_bytes(buffer) {
            Err(e) if e.is_timeout() => Ok(0),
            other => other,
        }
    }
}

/// Acquires devices by path.
pub trait DeviceOpener: Send + Sync + std::fmt::Debug {
    /// Acquire exclusive access to the device at `path`.
    ///
    /// Fails with [`PortError::DeviceUnavailable`] when the device is missing or busy.
    fn open(&self, path: &str) -> Result<Box<dyn SerialDevice>, PortError>;
}

/// Transfer strategy of a port.
///
/// The port owns the device and lends it to the strategy for each call. The
/// strategy holds only its own state (wait primitive, in-flight operations,
/// retry policy).
pub trait Transport: Send + std::fmt::Debug {
    fn mode(&self) -> TransportMode;

    /// Timeout the device rests at between calls.
    fn idle_timeout(&self, timeouts: &Timeouts) -> Duration;

    /// Prepare per-open state once the device is acquired and configured.
    ///
    /// An error here leaves the port usable; the caller only logs it.
    fn attach(&mut self, device: &mut dyn SerialDevice) -> Result<(), PortError>;

    /// Release per-open state. Must be idempotent.
    fn detach(&mut self);

    /// Transmit `data` in order.
    fn write(
        &mut self,
        device: &mut dyn SerialDevice,
        data: &[u8],
        timeouts: &Timeouts,
    ) -> Result<usize, PortError>;

    /// Read one byte, then drain whatever the driver already holds into the
    /// rest of `buffer`. Returns 0, 1 or 1 + N.
    fn read_drain(
        &mut self,
        device: &mut dyn SerialDevice,
        buffer: &mut [u8],
    ) -> Result<usize, PortError>;

    /// Whether an operation in `direction` was issued and has not completed.
    fn has_pending(&self, _direction: Direction) -> bool {
        false
    }

    /// Completion wait primitive, if the strategy has one.
    fn completion_event(&self) -> Option<Arc<CompletionEvent>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(TransportMode::from_flag(true), TransportMode::EventDriven);
        assert_eq!(TransportMode::from_flag(false), TransportMode::Blocking);
    }

    #[test]
    fn test_purge_conversion() {
        let clear: serialport::ClearBuffer = Purge::Input.into();
        assert!(matches!(clear, serialport::ClearBuffer::Input));
        let clear: serialport::ClearBuffer = Purge::All.into();
        assert!(matches!(clear, serialport::ClearBuffer::All));
    }
}
