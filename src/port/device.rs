//! OS-backed serial device.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own
//! [`SerialDevice`] trait, and owns the device-name convention callers rely on.

use super::error::PortError;
use super::event_driven::CompletionEvent;
use super::settings::{PortSettings, FALLBACK_BAUD_RATE};
use super::traits::{DeviceOpener, Purge, SerialDevice};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// How often the receive watcher samples the driver's input queue.
const RX_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Prefix prepended to short device names.
#[cfg(windows)]
pub const DEVICE_PREFIX: &str = r"\\.\COM";
#[cfg(not(windows))]
pub const DEVICE_PREFIX: &str = "/dev/ttyACM";

/// Build the OS device path from a caller-supplied name.
///
/// A short suffix such as `"3"` gets the platform prefix (`\\.\COM3` on
/// Windows, `/dev/ttyACM3` elsewhere). A name that is already a full path is
/// used verbatim.
///
/// # Example
/// ```
/// use usb_stream::port::device_path;
///
/// #[cfg(unix)]
/// assert_eq!(device_path("0"), "/dev/ttyACM0");
/// #[cfg(unix)]
/// assert_eq!(device_path("/dev/ttyUSB1"), "/dev/ttyUSB1");
/// ```
pub fn device_path(device: &str) -> String {
    #[cfg(windows)]
    {
        if device.starts_with(r"\\.\") {
            device.to_string()
        } else if device.len() > 3 && device.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("COM")) {
            format!(r"\\.\{device}")
        } else {
            format!("{DEVICE_PREFIX}{device}")
        }
    }

    #[cfg(not(windows))]
    {
        if device.starts_with('/') {
            device.to_string()
        } else {
            format!("{DEVICE_PREFIX}{device}")
        }
    }
}

/// Opens real devices through `serialport`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl DeviceOpener for SystemOpener {
    fn open(&self, path: &str) -> Result<Box<dyn SerialDevice>, PortError> {
        let device = SystemDevice::open(path)?;
        Ok(Box::new(device))
    }
}

/// Serial device wrapping `serialport::SerialPort`.
pub struct SystemDevice {
    /// Receive watcher; stopped before the port handle closes.
    watcher: Option<RxWatcher>,
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port path for identification.
    name: String,
}

impl SystemDevice {
    /// Acquire the device at `path`.
    ///
    /// The device is opened exclusively (the `serialport` default on Unix; COM
    /// handles are never shared on Windows). Line settings are applied
    /// separately so a rejected configuration can be told apart from a missing
    /// device.
    pub fn open(path: &str) -> Result<Self, PortError> {
        let port = serialport::new(path, FALLBACK_BAUD_RATE)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| PortError::unavailable(path, e.to_string()))?;

        Ok(Self {
            watcher: None,
            port,
            name: path.to_string(),
        })
    }
}

impl SerialDevice for SystemDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data).map_err(PortError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port.set_timeout(timeout).map_err(PortError::Serial)
    }

    fn timeout(&self) -> Duration {
        self.port.timeout()
    }

    fn apply_settings(&mut self, settings: &PortSettings) -> Result<(), PortError> {
        let reject = |e: serialport::Error| PortError::rejected(self.name.clone(), e.to_string());
        let port = &mut self.port;
        port.set_baud_rate(settings.baud_rate.get()).map_err(reject)?;
        port.set_data_bits(settings.data_bits.into()).map_err(reject)?;
        port.set_parity(settings.parity.into()).map_err(reject)?;
        port.set_stop_bits(settings.stop_bits.into()).map_err(reject)?;
        port.set_flow_control(settings.flow_control.into())
            .map_err(reject)
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(PortError::Serial)
    }

    fn clear_buffers(&mut self, purge: Purge) -> Result<(), PortError> {
        self.port.clear(purge.into()).map_err(PortError::Serial)
    }

    /// `serialport` exposes no receive event, so a watcher thread samples the
    /// input queue on a cloned handle and sets `event` when it grows.
    fn notify_on_receive(&mut self, event: Arc<CompletionEvent>) -> Result<(), PortError> {
        let port = self.port.try_clone().map_err(PortError::Serial)?;
        self.watcher = Some(RxWatcher::spawn(&self.name, port, event)?);
        Ok(())
    }
}

/// Background thread standing in for a received-character event mask.
struct RxWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RxWatcher {
    fn spawn(
        name: &str,
        port: Box<dyn serialport::SerialPort>,
        event: Arc<CompletionEvent>,
    ) -> Result<Self, PortError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let path = name.to_string();

        let thread = std::thread::Builder::new()
            .name("usb-stream-rx".to_string())
            .spawn(move || {
                let mut queued = 0u32;
                while !flag.load(Ordering::Acquire) {
                    match port.bytes_to_read() {
                        Ok(n) => {
                            if n > queued {
                                event.set();
                            }
                            queued = n;
                        }
                        Err(e) => {
                            warn!(path = %path, error = %e, "receive watcher stopped");
                            return;
                        }
                    }
                    std::thread::sleep(RX_POLL_INTERVAL);
                }
                debug!(path = %path, "receive watcher finished");
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for RxWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for SystemDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemDevice")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .field("notifies_on_receive", &self.watcher.is_some())
            .finish()
    }
}
