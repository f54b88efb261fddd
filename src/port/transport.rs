//! [`PortTransport`]: one owned serial port behind a uniform API.
//!
//! The port is either open (it holds a device) or closed (it holds none);
//! there is no half-open state. Every data operation comes in two flavours:
//!
//! - the plain method (`write`, `read`, `read_timeout`, ...) never fails. Errors,
//!   including use of a closed port, become a zero/`None`/`false` result and
//!   are recorded in [`last_error`](PortTransport::last_error);
//! - the `try_*` method returns the `Result`, so a fault can be told apart
//!   from a read that simply timed out with nothing to deliver.
//!
//! An instance is meant for one thread at a time; `&mut self` on every
//! mutating call enforces that. Share it across threads or tasks through
//! `AsyncPortTransport` or your own lock. An [`AbortHandle`] is the one piece
//! that works without the lock: it makes an in-flight `read_timeout` return
//! within a few milliseconds so that a pending `close` can proceed.

use super::blocking::BlockingTransport;
use super::device::{device_path, SystemOpener};
use super::error::PortError;
use super::event_driven::{CompletionEvent, EventDrivenTransport, RetryPolicy};
use super::settings::{PortSettings, Timeouts};
use super::traits::{Direction, DeviceOpener, Purge, SerialDevice, Transport, TransportMode};
use crate::config::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest single device wait inside `read_timeout`; bounds how long an abort
/// takes to be noticed.
const READ_SLICE: Duration = Duration::from_millis(5);

/// Interrupts reads on a [`PortTransport`] from another thread or task.
///
/// The request stays raised until the port is closed or reopened.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    raised: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Make the in-flight and any following `read_timeout` return what it has.
    pub fn abort(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.raised.store(false, Ordering::Release);
    }
}

/// Result of [`PortTransport::open`], with stable integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OpenStatus {
    /// Device acquired, configured and purged.
    Ok = 0,
    /// The device could not be acquired.
    InvalidHandle = 1,
    /// The device was acquired but refused the settings; it has been released.
    ConfigureFailed = 2,
}

impl OpenStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl From<&PortError> for OpenStatus {
    fn from(err: &PortError) -> Self {
        match err {
            PortError::ConfigurationRejected { .. } => Self::ConfigureFailed,
            _ => Self::InvalidHandle,
        }
    }
}

impl std::fmt::Display for OpenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::InvalidHandle => write!(f, "invalid handle"),
            Self::ConfigureFailed => write!(f, "configure failed"),
        }
    }
}

/// A serial port with a fixed transfer mode.
///
/// # Example
/// ```no_run
/// use usb_stream::port::{OpenStatus, PortTransport};
/// use std::time::Duration;
///
/// let mut port = PortTransport::new(false);
/// port.configure_port(115_200, 8, 0, 1, 0);
/// if port.open("0") == OpenStatus::Ok {
///     port.write(&[0xf7, 0x7b, 0x00, 0x00]);
///     let mut reply = [0u8; 44];
///     let n = port.read_timeout(&mut reply, Duration::from_millis(20));
///     println!("got {n} bytes");
/// }
/// ```
pub struct PortTransport {
    opener: Box<dyn DeviceOpener>,
    transport: Box<dyn Transport>,
    device: Option<Box<dyn SerialDevice>>,
    settings: PortSettings,
    timeouts: Timeouts,
    last_error: Option<PortError>,
    abort: AbortHandle,
}

impl PortTransport {
    /// Create a closed port on the OS backend.
    ///
    /// `use_event_driven` selects [`TransportMode::EventDriven`]; otherwise the
    /// port is [`TransportMode::Blocking`]. Settings start at 115200 8N1 with no
    /// flow control.
    pub fn new(use_event_driven: bool) -> Self {
        Self::with_opener(TransportMode::from_flag(use_event_driven), SystemOpener)
    }

    /// Create a closed port that acquires devices through `opener`.
    pub fn with_opener(mode: TransportMode, opener: impl DeviceOpener + 'static) -> Self {
        let transport: Box<dyn Transport> = match mode {
            TransportMode::Blocking => Box::new(BlockingTransport::new()),
            TransportMode::EventDriven => {
                Box::new(EventDrivenTransport::new(RetryPolicy::default()))
            }
        };
        Self::from_parts(Box::new(opener), transport)
    }

    /// Create a closed port from an explicit opener and transfer strategy.
    pub fn from_parts(opener: Box<dyn DeviceOpener>, transport: Box<dyn Transport>) -> Self {
        Self {
            opener,
            transport,
            device: None,
            settings: PortSettings::default(),
            timeouts: Timeouts::default(),
            last_error: None,
            abort: AbortHandle::default(),
        }
    }

    /// Create a closed port on the OS backend, configured from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::from_config_with_opener(config, SystemOpener)
    }

    /// Like [`from_config`](Self::from_config) with a custom opener.
    pub fn from_config_with_opener(config: &Config, opener: impl DeviceOpener + 'static) -> Self {
        let transport: Box<dyn Transport> = if config.port.event_driven {
            Box::new(EventDrivenTransport::new(config.retry.policy()))
        } else {
            Box::new(BlockingTransport::new())
        };
        let mut port = Self::from_parts(Box::new(opener), transport);
        port.configure(config.port.settings());
        port.set_timeout_policy(config.timeouts);
        port
    }

    pub fn mode(&self) -> TransportMode {
        self.transport.mode()
    }

    /// Settings that will be applied at the next open.
    pub fn settings(&self) -> PortSettings {
        self.settings
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Path of the open device.
    pub fn path(&self) -> Option<&str> {
        self.device.as_deref().map(|d| d.name())
    }

    /// Error swallowed by the most recent non-`try_*` call, if it failed.
    pub fn last_error(&self) -> Option<&PortError> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<PortError> {
        self.last_error.take()
    }

    /// Whether an event-driven operation is in flight in `direction`.
    pub fn has_pending(&self, direction: Direction) -> bool {
        self.transport.has_pending(direction)
    }

    /// Completion event of the event-driven transport while open.
    ///
    /// It is also set when new bytes arrive, so a caller can wait on it for
    /// incoming data.
    pub fn completion_event(&self) -> Option<Arc<CompletionEvent>> {
        self.transport.completion_event()
    }

    /// Handle that interrupts reads without access to the port.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    // ---- lifecycle ----

    /// Open the device named `device` (a suffix such as `"3"`, or a full path).
    ///
    /// An already open port is closed first, which is how new settings reach
    /// the device.
    pub fn open(&mut self, device: &str) -> OpenStatus {
        match self.try_open(device) {
            Ok(()) => {
                self.last_error = None;
                OpenStatus::Ok
            }
            Err(e) => {
                let status = OpenStatus::from(&e);
                warn!(device, %status, error = %e, "open failed");
                self.last_error = Some(e);
                status
            }
        }
    }

    /// [`open`](Self::open) returning the underlying error.
    pub fn try_open(&mut self, device: &str) -> Result<(), PortError> {
        self.close();

        let path = device_path(device);
        let mut handle = self.opener.open(&path)?;

        let idle = self.transport.idle_timeout(&self.timeouts);
        let configured = handle
            .apply_settings(&self.settings)
            .and_then(|()| handle.set_timeout(idle))
            .map_err(|e| match e {
                PortError::ConfigurationRejected { .. } => e,
                other => PortError::rejected(path.clone(), other.to_string()),
            });
        if let Err(e) = configured {
            drop(handle);
            return Err(e);
        }

        if let Err(e) = self.transport.attach(handle.as_mut()) {
            warn!(path = %path, error = %e, "receive notification unavailable");
        }
        if let Err(e) = handle.clear_buffers(Purge::All) {
            warn!(path = %path, error = %e, "failed to purge stale bytes");
        }

        info!(
            path = %path,
            mode = ?self.mode(),
            baud = self.settings.baud_rate.get(),
            "port opened"
        );
        self.device = Some(handle);
        Ok(())
    }

    /// Release the device. Safe to call repeatedly or on a never-opened port.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            info!(path = %device.name(), "port closed");
        }
        self.transport.detach();
        self.abort.clear();
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Alias of [`is_open`](Self::is_open).
    pub fn good(&self) -> bool {
        self.is_open()
    }

    // ---- configuration ----

    /// Store line settings from integer codes.
    ///
    /// Unrecognised values fall back instead of failing: baud to 115200, char
    /// size to 8, parity to none, stop bits to 1, flow control to none. The
    /// settings reach the device at the next [`open`](Self::open).
    pub fn configure_port(
        &mut self,
        baud: i64,
        char_size: i64,
        parity: i64,
        stop_bits: i64,
        flow_control: i64,
    ) {
        let settings = PortSettings::from_codes(baud, char_size, parity, stop_bits, flow_control);
        if i64::from(settings.baud_rate.get()) != baud {
            warn!(requested = baud, used = settings.baud_rate.get(), "unsupported baud rate");
        }
        if settings.data_bits.code() != char_size {
            warn!(requested = char_size, used = settings.data_bits.code(), "unsupported character size");
        }
        self.configure(settings);
    }

    /// Store typed line settings; applied at the next [`open`](Self::open).
    pub fn configure(&mut self, settings: PortSettings) {
        self.settings = settings;
        if self.is_open() {
            debug!("settings stored; reopen the port to apply them");
        }
    }

    /// Store the timeout policy, in milliseconds.
    ///
    /// A blocking port applies it to the open device immediately. An
    /// event-driven port only stores it: its completion timing is governed by
    /// the completion event and retry policy, not by these values.
    pub fn set_timeouts(
        &mut self,
        read_interval: f64,
        read_total_constant: f64,
        read_total_multiplier: f64,
        write_total_constant: f64,
        write_total_multiplier: f64,
    ) {
        self.set_timeout_policy(Timeouts {
            read_interval,
            read_total_constant,
            read_total_multiplier,
            write_total_constant,
            write_total_multiplier,
        });
    }

    pub fn set_timeout_policy(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
        if self.mode() != TransportMode::Blocking {
            return;
        }
        let idle = self.transport.idle_timeout(&self.timeouts);
        if let Some(device) = self.device.as_deref_mut() {
            let result = device.set_timeout(idle);
            self.settle("set_timeouts", result);
        }
    }

    // ---- data transfer ----

    /// Transmit `data`, returning the number of bytes the device accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let result = self.try_write(data);
        self.settle("write", result)
    }

    pub fn try_write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let device = self.device.as_deref_mut().ok_or(PortError::NotOpen)?;
        self.transport.write(device, data, &self.timeouts)
    }

    /// Read one byte, then drain the bytes already queued behind it into the
    /// rest of `buffer`. Returns 0, 1 or 1 + N.
    ///
    /// An event-driven port purges both directions when a byte arrives alone.
    pub fn read(&mut self, buffer: &mut [u8]) -> usize {
        let result = self.try_read(buffer);
        self.settle("read", result)
    }

    pub fn try_read(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let device = self.device.as_deref_mut().ok_or(PortError::NotOpen)?;
        self.transport.read_drain(device, buffer)
    }

    /// Read up to `buffer.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns the number of bytes actually received; 0 when nothing arrived.
    /// A timeout too large to form a deadline waits until the buffer is full
    /// or the read is aborted through an [`AbortHandle`].
    pub fn read_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> usize {
        let result = self.try_read_timeout(buffer, timeout);
        self.settle("read_timeout", result)
    }

    pub fn try_read_timeout(
        &mut self,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, PortError> {
        let idle = self.transport.idle_timeout(&self.timeouts);
        let device = self.device.as_deref_mut().ok_or(PortError::NotOpen)?;
        if buffer.is_empty() {
            return Ok(0);
        }

        let deadline = Instant::now().checked_add(timeout);
        let result = fill_until(device, buffer, deadline, &self.abort);
        let restored = device.set_timeout(idle);
        let filled = result?;
        restored?;
        Ok(filled)
    }

    /// Read exactly one byte, waiting at most `timeout`; `None` on timeout.
    pub fn get_one_byte(&mut self, timeout: Duration) -> Option<u8> {
        let result = self.try_get_one_byte(timeout);
        self.settle("get_one_byte", result)
    }

    pub fn try_get_one_byte(&mut self, timeout: Duration) -> Result<Option<u8>, PortError> {
        let mut byte = [0u8; 1];
        let n = self.try_read_timeout(&mut byte, timeout)?;
        Ok((n == 1).then_some(byte[0]))
    }

    /// Whether at least one unread byte is queued. Never blocks.
    pub fn is_data_available(&mut self) -> bool {
        let result = self.try_is_data_available();
        self.settle("is_data_available", result)
    }

    pub fn try_is_data_available(&self) -> Result<bool, PortError> {
        let device = self.device.as_deref().ok_or(PortError::NotOpen)?;
        Ok(device.bytes_to_read()? > 0)
    }

    /// Discard buffered input and output.
    pub fn clear_buffer(&mut self) {
        let result = self.try_clear_buffer();
        self.settle("clear_buffer", result)
    }

    pub fn try_clear_buffer(&mut self) -> Result<(), PortError> {
        let device = self.device.as_deref_mut().ok_or(PortError::NotOpen)?;
        debug!(path = %device.name(), "purging buffers");
        device.clear_buffers(Purge::All)
    }

    /// Turn a result into the compatibility surface's plain value.
    fn settle<T: Default>(&mut self, operation: &'static str, result: Result<T, PortError>) -> T {
        match result {
            Ok(value) => {
                self.last_error = None;
                value
            }
            Err(e) => {
                if matches!(e, PortError::NotOpen) {
                    debug!(operation, "ignored on closed port");
                } else {
                    warn!(operation, error = %e, "port operation failed");
                }
                self.last_error = Some(e);
                T::default()
            }
        }
    }
}

/// Read into `buffer` until it is full, `deadline` passes or `abort` is raised.
///
/// No deadline means no time limit. Each device wait is at most
/// [`READ_SLICE`].
fn fill_until(
    device: &mut dyn SerialDevice,
    buffer: &mut [u8],
    deadline: Option<Instant>,
    abort: &AbortHandle,
) -> Result<usize, PortError> {
    let mut filled = 0;
    while filled < buffer.len() {
        if abort.is_aborted() {
            debug!(filled, "read aborted");
            break;
        }
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => READ_SLICE,
        };
        device.set_timeout(remaining.min(READ_SLICE))?;
        filled += device.read_some(&mut buffer[filled..])?;
        if remaining.is_zero() {
            break;
        }
    }
    Ok(filled)
}

impl Drop for PortTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortTransport")
            .field("mode", &self.mode())
            .field("path", &self.path())
            .field("settings", &self.settings)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}
