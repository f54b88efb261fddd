//! Blocking transport: every call waits on the device, bounded by the timeout policy.

use super::error::PortError;
use super::settings::Timeouts;
use super::traits::{SerialDevice, Transport, TransportMode};
use std::time::Duration;
use tracing::trace;

/// Transfer strategy that blocks the calling thread until the device accepts
/// or delivers data, or the timeout policy expires.
///
/// Timeouts passed to `set_timeouts` apply to the live device immediately.
#[derive(Debug, Default)]
pub struct BlockingTransport;

impl BlockingTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for BlockingTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Blocking
    }

    fn idle_timeout(&self, timeouts: &Timeouts) -> Duration {
        timeouts.read_budget(1)
    }

    fn attach(&mut self, _device: &mut dyn SerialDevice) -> Result<(), PortError> {
        Ok(())
    }

    fn detach(&mut self) {}

    /// One device write for the whole buffer; the accepted count is returned
    /// as-is, without retrying the remainder.
    fn write(
        &mut self,
        device: &mut dyn SerialDevice,
        data: &[u8],
        timeouts: &Timeouts,
    ) -> Result<usize, PortError> {
        if data.is_empty() {
            return Ok(0);
        }

        device.set_timeout(timeouts.write_budget(data.len()))?;
        let result = match device.write_bytes(data) {
            Err(e) if e.is_timeout() => Ok(0),
            other => other,
        };
        device.set_timeout(self.idle_timeout(timeouts))?;

        let written = result?;
        trace!(requested = data.len(), written, "blocking write");
        Ok(written)
    }

    fn read_drain(
        &mut self,
        device: &mut dyn SerialDevice,
        buffer: &mut [u8],
    ) -> Result<usize, PortError> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let first = device.read_some(&mut buffer[..1])?;
        if first == 0 {
            return Ok(0);
        }

        let queued = device.bytes_to_read()?.min(buffer.len() - 1);
        let drained = if queued > 0 {
            device.read_some(&mut buffer[1..=queued])?
        } else {
            0
        };

        trace!(drained, "blocking drain read");
        Ok(1 + drained)
    }
}
