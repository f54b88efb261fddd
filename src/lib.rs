//! USB-CDC serial port transport.
//!
//! [`PortTransport`] owns one serial device and moves bytes over it with
//! either a blocking or an event-driven transfer model, chosen when the port
//! is constructed.
//!
//! # Modules
//!
//! - `port`: the transport, its device seam and the in-memory loopback
//! - `config`: `usb-stream.toml` loading with environment overrides
//! - `logging`: tracing subscriber setup

pub mod config;
pub mod logging;
pub mod port;

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use port::{
    AbortHandle, DataBits, FlowControl, LoopbackOpener, OpenStatus, Parity, PortError, PortSettings,
    PortTransport, StopBits, Timeouts, TransportMode,
};

#[cfg(feature = "async-serial")]
pub use port::{AsyncPortTransport, AsyncTransport};
