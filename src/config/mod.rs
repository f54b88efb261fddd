//! Configuration for `usb-stream`.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `USB_STREAM_CONFIG` environment variable (explicit path)
//! 2. `./usb-stream.toml` (current directory)
//! 3. `~/.config/usb-stream/usb-stream.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\usb-stream\usb-stream.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `USB_STREAM_<SECTION>_<KEY>`:
//! - `USB_STREAM_PORT_DEVICE=3`
//! - `USB_STREAM_PORT_BAUD_RATE=9600`
//! - `USB_STREAM_RETRY_MAX_ATTEMPTS=16`
//!
//! # Example
//!
//! ```rust,no_run
//! use usb_stream::config::ConfigLoader;
//! use usb_stream::port::PortTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = ConfigLoader::load()?;
//! let mut port = PortTransport::from_config(loader.config());
//! port.try_open(loader.config().port.device.as_deref().unwrap_or("0"))?;
//! # Ok(())
//! # }
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, PortSection, RetrySection};
