//! Async facade over [`PortTransport`].
//!
//! Each call runs on Tokio's blocking pool via `tokio::task::spawn_blocking`,
//! so a blocking read or an event-driven retry loop never stalls the runtime.
//! The port sits behind a mutex: calls from several tasks are serialised.
//! `close` is the exception that does not wait its turn: it aborts an
//! in-flight read first, so it completes within milliseconds.
//!
//! Note: This module is gated behind the `async-serial` feature flag.

use super::error::PortError;
use super::transport::{AbortHandle, OpenStatus, PortTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Async serial transfer operations.
///
/// Requires `Send` but not `Sync`: a port is driven through `&mut self`.
#[async_trait]
pub trait AsyncTransport: Send {
    /// Transmit `data`, returning the number of bytes accepted.
    async fn write(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Drain read: one byte plus whatever is already queued behind it.
    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Read up to `buffer.len()` bytes within `timeout`; 0 when nothing arrived.
    async fn read_timeout(
        &mut self,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, PortError>;

    /// Read exactly one byte within `timeout`.
    async fn get_one_byte(&mut self, timeout: Duration) -> Result<Option<u8>, PortError>;

    /// Whether at least one unread byte is queued.
    async fn is_data_available(&mut self) -> Result<bool, PortError>;
}

/// [`PortTransport`] shared behind a mutex and driven from async code.
#[derive(Clone)]
pub struct AsyncPortTransport {
    inner: Arc<Mutex<PortTransport>>,
    abort: AbortHandle,
}

impl AsyncPortTransport {
    /// Wrap a port, open or not.
    ///
    /// # Example
    /// ```no_run
    /// use usb_stream::port::{AsyncPortTransport, AsyncTransport, PortTransport};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut port = AsyncPortTransport::new(PortTransport::new(true));
    /// port.open("0").await?;
    /// port.write(b"\xf7\x7b").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(port: PortTransport) -> Self {
        let abort = port.abort_handle();
        Self {
            inner: Arc::new(Mutex::new(port)),
            abort,
        }
    }

    /// Open `device` on the blocking pool.
    pub async fn open(&mut self, device: &str) -> Result<(), PortError> {
        let device = device.to_string();
        self.run(move |port| port.try_open(&device)).await
    }

    /// Open `device`, reporting the status code instead of the error.
    pub async fn open_status(&mut self, device: &str) -> OpenStatus {
        let device = device.to_string();
        self.run(move |port| Ok(port.open(&device)))
            .await
            .unwrap_or(OpenStatus::InvalidHandle)
    }

    /// Close the port, cutting short a read another task has in flight.
    pub async fn close(&mut self) {
        self.abort.abort();
        let _ = self.run(|port| {
            port.close();
            Ok(())
        })
        .await;
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().is_open()
    }

    /// Lock the port for synchronous access (configuration, inspection).
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, PortTransport> {
        self.inner.lock()
    }

    async fn run<T, F>(&self, op: F) -> Result<T, PortError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PortTransport) -> Result<T, PortError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut port = inner.lock();
            op(&mut *port)
        })
        .await
        .map_err(|e| PortError::Io(std::io::Error::other(e)))?
    }

    /// Run a read on the blocking pool through a scratch buffer sized like `buffer`.
    async fn read_into<F>(&self, buffer: &mut [u8], op: F) -> Result<usize, PortError>
    where
        F: FnOnce(&mut PortTransport, &mut [u8]) -> Result<usize, PortError> + Send + 'static,
    {
        let mut scratch = vec![0u8; buffer.len()];
        let (scratch, n) = self
            .run(move |port| {
                let n = op(port, &mut scratch)?;
                Ok((scratch, n))
            })
            .await?;
        buffer[..n].copy_from_slice(&scratch[..n]);
        Ok(n)
    }
}

#[async_trait]
impl AsyncTransport for AsyncPortTransport {
    async fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let data = data.to_vec();
        self.run(move |port| port.try_write(&data)).await
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.read_into(buffer, |port, scratch| port.try_read(scratch))
            .await
    }

    async fn read_timeout(
        &mut self,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, PortError> {
        self.read_into(buffer, move |port, scratch| {
            port.try_read_timeout(scratch, timeout)
        })
        .await
    }

    async fn get_one_byte(&mut self, timeout: Duration) -> Result<Option<u8>, PortError> {
        self.run(move |port| port.try_get_one_byte(timeout)).await
    }

    async fn is_data_available(&mut self) -> Result<bool, PortError> {
        self.run(|port| port.try_is_data_available()).await
    }
}

impl std::fmt::Debug for AsyncPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPortTransport")
            .field("inner", &*self.inner.lock())
            .finish()
    }
}
