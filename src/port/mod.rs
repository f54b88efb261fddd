//! Port abstraction layer for USB-CDC serial communication.
//!
//! [`PortTransport`] owns one device and exposes open/close, configuration,
//! and the read/write variants. The transfer model is a [`Transport`]
//! strategy chosen at construction ([`BlockingTransport`] or
//! [`EventDrivenTransport`]); the device itself sits behind [`DeviceOpener`] /
//! [`SerialDevice`], with the OS backend in [`SystemOpener`] and an in-memory
//! [`LoopbackOpener`] for tests.

pub mod blocking;
pub mod device;
pub mod error;
pub mod event_driven;
pub mod loopback;
pub mod settings;
pub mod traits;
pub mod transport;

#[cfg(feature = "async-serial")]
pub mod async_port;

pub use blocking::BlockingTransport;
pub use device::{device_path, SystemDevice, SystemOpener, DEVICE_PREFIX};
pub use error::PortError;
pub use event_driven::{CompletionEvent, EventDrivenTransport, RetryPolicy};
pub use loopback::{LoopbackDevice, LoopbackHandle, LoopbackOpener};
pub use settings::{
    BaudRate, DataBits, FlowControl, Parity, PortSettings, StopBits, Timeouts,
    FALLBACK_BAUD_RATE, SUPPORTED_BAUD_RATES,
};
pub use traits::{DeviceOpener, Direction, Purge, SerialDevice, Transport, TransportMode};
pub use transport::{AbortHandle, OpenStatus, PortTransport};

#[cfg(feature = "async-serial")]
pub use async_port::{AsyncPortTransport, AsyncTransport};
