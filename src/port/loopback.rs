//! In-memory loopback device for testing.
//!
//! A [`LoopbackOpener`] hands out [`LoopbackDevice`]s for registered paths.
//! Each registered path has a [`LoopbackHandle`] that plays the far end of the
//! wire: it injects bytes as if a peer had sent them, inspects what the port
//! wrote, and injects faults. With echo enabled (the default) every byte the
//! port writes comes back on its own input queue. Bytes reaching the input
//! queue also set the event armed with `notify_on_receive`, if any.

use super::error::PortError;
use super::event_driven::CompletionEvent;
use super::settings::PortSettings;
use super::traits::{DeviceOpener, Purge, SerialDevice};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wire state shared between a device and its handle.
#[derive(Debug)]
struct Wire {
    /// Bytes waiting to be read by the port.
    input: VecDeque<u8>,
    /// Every successful write, in order.
    write_log: Vec<Vec<u8>>,
    /// Calls to `write_bytes`, including stalled and failed ones.
    write_attempts: usize,
    /// Feed written bytes back into `input`.
    echo: bool,
    /// Held by an open device.
    owned: bool,
    /// Settings the port applied on its last open.
    applied: Option<PortSettings>,
    /// Number of purges that touched the input queue.
    purges: usize,
    /// Upcoming writes that report "not yet complete".
    stalled_writes: usize,
    /// Hard write failure.
    write_fault: Option<String>,
    /// Configuration refusal.
    reject_config: Option<String>,
    /// Refusal to arm receive notification.
    notify_fault: Option<String>,
    /// Set whenever bytes reach `input`.
    on_receive: Option<Arc<CompletionEvent>>,
}

impl Wire {
    fn receive(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.input.extend(data);
        if let Some(event) = &self.on_receive {
            event.set();
        }
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self {
            input: VecDeque::new(),
            write_log: Vec::new(),
            write_attempts: 0,
            echo: true,
            owned: false,
            applied: None,
            purges: 0,
            stalled_writes: 0,
            write_fault: None,
            reject_config: None,
            notify_fault: None,
            on_receive: None,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    wire: Mutex<Wire>,
    arrived: Condvar,
}

impl Shared {
    fn push_input(&self, data: &[u8]) {
        self.wire.lock().receive(data);
        self.arrived.notify_all();
    }
}

/// Opens loopback devices for registered paths.
///
/// # Example
/// ```
/// use usb_stream::port::{LoopbackOpener, PortTransport, TransportMode, OpenStatus};
///
/// let opener = LoopbackOpener::new();
/// let peer = opener.register(usb_stream::port::device_path("0"));
///
/// let mut port = PortTransport::with_opener(TransportMode::Blocking, opener);
/// assert_eq!(port.open("0"), OpenStatus::Ok);
///
/// port.write(b"ping");
/// assert_eq!(peer.written(), b"ping");
/// ```
#[derive(Debug, Default, Clone)]
pub struct LoopbackOpener {
    devices: Arc<Mutex<HashMap<String, Arc<Shared>>>>,
}

impl LoopbackOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a device available at `path` and return its peer handle.
    ///
    /// Registering an existing path returns a handle to the same wire.
    pub fn register(&self, path: impl Into<String>) -> LoopbackHandle {
        let path = path.into();
        let shared = self
            .devices
            .lock()
            .entry(path.clone())
            .or_default()
            .clone();
        LoopbackHandle { path, shared }
    }

    /// Remove the device at `path`, as if it were unplugged.
    pub fn unregister(&self, path: &str) {
        self.devices.lock().remove(path);
    }
}

impl DeviceOpener for LoopbackOpener {
    fn open(&self, path: &str) -> Result<Box<dyn SerialDevice>, PortError> {
        let shared = self
            .devices
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| PortError::unavailable(path, "No such device"))?;

        {
            let mut wire = shared.wire.lock();
            if wire.owned {
                return Err(PortError::unavailable(path, "Device or resource busy"));
            }
            wire.owned = true;
        }

        Ok(Box::new(LoopbackDevice {
            name: path.to_string(),
            shared,
            timeout: Duration::ZERO,
        }))
    }
}

/// The far end of a loopback wire.
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    path: String,
    shared: Arc<Shared>,
}

impl LoopbackHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Send bytes to the port as the peer.
    pub fn inject(&self, data: &[u8]) {
        self.shared.push_input(data);
    }

    /// Everything the port wrote, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.shared.wire.lock().write_log.concat()
    }

    /// Every successful write call, in order.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.shared.wire.lock().write_log.clone()
    }

    /// Calls to `write_bytes`, including stalled and failed ones.
    pub fn write_attempts(&self) -> usize {
        self.shared.wire.lock().write_attempts
    }

    /// Bytes waiting on the port's input queue.
    pub fn queued(&self) -> usize {
        self.shared.wire.lock().input.len()
    }

    /// Toggle feeding written bytes back to the port.
    pub fn set_echo(&self, echo: bool) {
        self.shared.wire.lock().echo = echo;
    }

    /// Whether a device currently holds this wire.
    pub fn is_owned(&self) -> bool {
        self.shared.wire.lock().owned
    }

    /// Settings applied by the most recent open.
    pub fn applied_settings(&self) -> Option<PortSettings> {
        self.shared.wire.lock().applied
    }

    /// Number of purges that touched the input queue.
    pub fn purge_count(&self) -> usize {
        self.shared.wire.lock().purges
    }

    /// Make the next `count` write calls report "not yet complete".
    pub fn stall_writes(&self, count: usize) {
        self.shared.wire.lock().stalled_writes = count;
    }

    /// Make every write fail hard until [`clear_faults`](Self::clear_faults).
    pub fn fail_writes(&self, reason: impl Into<String>) {
        self.shared.wire.lock().write_fault = Some(reason.into());
    }

    /// Refuse line settings on the next open.
    pub fn reject_configuration(&self, reason: impl Into<String>) {
        self.shared.wire.lock().reject_config = Some(reason.into());
    }

    /// Refuse receive notification on the next open.
    pub fn fail_notifications(&self, reason: impl Into<String>) {
        self.shared.wire.lock().notify_fault = Some(reason.into());
    }

    /// Whether an open device has receive notification armed.
    pub fn notifies_on_receive(&self) -> bool {
        self.shared.wire.lock().on_receive.is_some()
    }

    pub fn clear_faults(&self) {
        let mut wire = self.shared.wire.lock();
        wire.stalled_writes = 0;
        wire.write_fault = None;
        wire.reject_config = None;
        wire.notify_fault = None;
    }
}

/// Device end of a loopback wire.
#[derive(Debug)]
pub struct LoopbackDevice {
    name: String,
    shared: Arc<Shared>,
    timeout: Duration,
}

impl SerialDevice for LoopbackDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut wire = self.shared.wire.lock();
        wire.write_attempts += 1;

        if let Some(reason) = &wire.write_fault {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                reason.clone(),
            )));
        }
        if wire.stalled_writes > 0 {
            wire.stalled_writes -= 1;
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "Write not yet complete",
            )));
        }
        if data.is_empty() {
            return Ok(0);
        }

        wire.write_log.push(data.to_vec());
        if wire.echo {
            wire.receive(data);
            self.shared.arrived.notify_all();
        }
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let deadline = Instant::now().checked_add(self.timeout);
        let mut wire = self.shared.wire.lock();
        while wire.input.is_empty() {
            match deadline {
                Some(deadline) => {
                    if self.shared.arrived.wait_until(&mut wire, deadline).timed_out() {
                        break;
                    }
                }
                None => self.shared.arrived.wait(&mut wire),
            }
        }
        if wire.input.is_empty() {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Operation timed out",
            )));
        }

        let n = buffer.len().min(wire.input.len());
        for (slot, byte) in buffer.iter_mut().zip(wire.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn apply_settings(&mut self, settings: &PortSettings) -> Result<(), PortError> {
        let mut wire = self.shared.wire.lock();
        if let Some(reason) = wire.reject_config.take() {
            return Err(PortError::rejected(self.name.clone(), reason));
        }
        wire.applied = Some(*settings);
        Ok(())
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        Ok(self.shared.wire.lock().input.len())
    }

    fn notify_on_receive(&mut self, event: Arc<CompletionEvent>) -> Result<(), PortError> {
        let mut wire = self.shared.wire.lock();
        if let Some(reason) = wire.notify_fault.take() {
            return Err(PortError::fault(reason));
        }
        wire.on_receive = Some(event);
        Ok(())
    }

    fn clear_buffers(&mut self, purge: Purge) -> Result<(), PortError> {
        let mut wire = self.shared.wire.lock();
        if matches!(purge, Purge::Input | Purge::All) {
            wire.input.clear();
            wire.purges += 1;
        }
        Ok(())
    }
}

impl Drop for LoopbackDevice {
    fn drop(&mut self) {
        let mut wire = self.shared.wire.lock();
        wire.owned = false;
        wire.on_receive = None;
    }
}
