//! Event-driven transport.
//!
//! Operations are issued without blocking (the device rests at a zero
//! timeout) and completion is announced on a manual-reset [`CompletionEvent`].
//! A write is issued byte by byte; a byte the device reports as not yet
//! complete is re-issued under a bounded [`RetryPolicy`] and the write fails
//! with [`PortError::IoFault`] once the policy is exhausted.
//!
//! At open the event is also armed for received-character notification: the
//! device sets it whenever new bytes arrive, so a caller can block on
//! [`CompletionEvent::wait_timeout`] instead of polling `is_data_available`.
//!
//! The calling thread still polls synchronously: no background thread waits
//! on the event. Use `AsyncPortTransport` (feature `async-serial`) for
//! future-based completion.
//!
//! The timeout policy stored with `set_timeouts` does not govern this
//! transport's completion timing; the retry policy and the event do.

use super::error::PortError;
use super::settings::Timeouts;
use super::traits::{Direction, Purge, SerialDevice, Transport, TransportMode};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Bounded retry with exponential back-off for bytes the device has not
/// accepted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per byte, including the first.
    pub max_attempts: u32,
    /// Pause after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for a single pause.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 64,
            initial_backoff: Duration::from_micros(50),
            max_backoff: Duration::from_millis(5),
        }
    }
}

impl RetryPolicy {
    /// Pause before attempt number `attempt + 1` (`attempt` starts at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

/// Manual-reset event: once set it stays set until [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct CompletionEvent {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl CompletionEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.signalled.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.signalled.lock()
    }

    /// Wait until the event is set or `timeout` passes. Returns whether it was set.
    ///
    /// A timeout too large to form a deadline waits without one.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut signalled = self.signalled.lock();
        while !*signalled {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut signalled, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut signalled),
            }
        }
        *signalled
    }
}

/// An operation that was issued and has not completed.
#[derive(Debug, Clone, Copy)]
struct PendingOperation {
    issued: Instant,
    attempts: u32,
}

impl PendingOperation {
    fn issue() -> Self {
        Self {
            issued: Instant::now(),
            attempts: 1,
        }
    }
}

/// Transfer strategy modelled on overlapped I/O.
#[derive(Debug, Default)]
pub struct EventDrivenTransport {
    retry: RetryPolicy,
    event: Option<Arc<CompletionEvent>>,
    pending_read: Option<PendingOperation>,
    pending_write: Option<PendingOperation>,
}

impl EventDrivenTransport {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Default::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn begin(&self) {
        if let Some(event) = &self.event {
            event.reset();
        }
    }

    fn complete(&self) {
        if let Some(event) = &self.event {
            event.set();
        }
    }

    /// Issue one byte until the device takes it or the retry policy runs out.
    fn write_byte(
        &mut self,
        device: &mut dyn SerialDevice,
        byte: u8,
        index: usize,
    ) -> Result<(), PortError> {
        let mut pending = PendingOperation::issue();
        loop {
            match device.write_bytes(std::slice::from_ref(&byte)) {
                Ok(n) if n > 0 => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_incomplete() => {}
                Err(e) => {
                    return Err(PortError::fault(format!(
                        "write failed at byte {index}: {e}"
                    )))
                }
            }

            if pending.attempts >= self.retry.max_attempts {
                return Err(PortError::fault(format!(
                    "byte {index} not accepted after {} attempts ({:?})",
                    pending.attempts,
                    pending.issued.elapsed()
                )));
            }

            let pause = self.retry.backoff(pending.attempts);
            debug!(index, attempt = pending.attempts, ?pause, "write pending, retrying");
            pending.attempts += 1;
            self.pending_write = Some(pending);
            std::thread::sleep(pause);
        }
    }
}

impl Transport for EventDrivenTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::EventDriven
    }

    fn idle_timeout(&self, _timeouts: &Timeouts) -> Duration {
        Duration::ZERO
    }

    fn attach(&mut self, device: &mut dyn SerialDevice) -> Result<(), PortError> {
        let event = Arc::new(CompletionEvent::new());
        self.event = Some(Arc::clone(&event));
        self.pending_read = None;
        self.pending_write = None;
        device.notify_on_receive(event)
    }

    fn detach(&mut self) {
        self.event = None;
        self.pending_read = None;
        self.pending_write = None;
    }

    fn write(
        &mut self,
        device: &mut dyn SerialDevice,
        data: &[u8],
        _timeouts: &Timeouts,
    ) -> Result<usize, PortError> {
        for (index, &byte) in data.iter().enumerate() {
            self.begin();
            self.pending_write = Some(PendingOperation::issue());
            let result = self.write_byte(device, byte, index);
            self.pending_write = None;
            result?;
            self.complete();
        }

        trace!(written = data.len(), "event-driven write");
        Ok(data.len())
    }

    /// Like the blocking drain, except that a lone byte with nothing queued
    /// behind it purges both directions.
    fn read_drain(
        &mut self,
        device: &mut dyn SerialDevice,
        buffer: &mut [u8],
    ) -> Result<usize, PortError> {
        if buffer.is_empty() {
            return Ok(0);
        }

        self.begin();
        let first = device.read_some(&mut buffer[..1])?;
        if first == 0 {
            let pending = self.pending_read.get_or_insert_with(PendingOperation::issue);
            pending.attempts = pending.attempts.saturating_add(1);
            trace!("read pending");
            return Ok(0);
        }
        self.pending_read = None;

        let queued = device.bytes_to_read()?;
        let drained = if queued > 0 {
            let take = queued.min(buffer.len() - 1);
            if take > 0 {
                device.read_some(&mut buffer[1..=take])?
            } else {
                0
            }
        } else {
            debug!("input queue empty after first byte, purging");
            device.clear_buffers(Purge::All)?;
            0
        };

        self.complete();
        trace!(drained, "event-driven drain read");
        Ok(1 + drained)
    }

    fn has_pending(&self, direction: Direction) -> bool {
        match direction {
            Direction::Read => self.pending_read.is_some(),
            Direction::Write => self.pending_write.is_some(),
        }
    }

    fn completion_event(&self) -> Option<Arc<CompletionEvent>> {
        self.event.clone()
    }
}
