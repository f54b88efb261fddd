//! Shared helpers for the loopback-backed integration tests.
//!
//! - `open_loopback`: a port opened on a fresh loopback wire
//! - `both_modes`: run a check against the blocking and event-driven transports

#![allow(dead_code)]

use std::time::Duration;
use usb_stream::port::{
    device_path, LoopbackHandle, LoopbackOpener, OpenStatus, PortTransport, TransportMode,
};

/// Device suffix every helper registers.
pub const DEVICE: &str = "0";

/// Generous bound for reads that are expected to succeed.
pub const READ_WAIT: Duration = Duration::from_millis(200);

/// A closed port plus the opener and peer of its loopback wire.
pub fn loopback_port(mode: TransportMode) -> (PortTransport, LoopbackOpener, LoopbackHandle) {
    let opener = LoopbackOpener::new();
    let peer = opener.register(device_path(DEVICE));
    let port = PortTransport::with_opener(mode, opener.clone());
    (port, opener, peer)
}

/// An open port on a fresh loopback wire.
///
/// # Panics
/// If the port does not open.
pub fn open_loopback(mode: TransportMode) -> (PortTransport, LoopbackHandle) {
    let (mut port, _opener, peer) = loopback_port(mode);
    assert_eq!(port.open(DEVICE), OpenStatus::Ok, "loopback open failed");
    (port, peer)
}

/// An open port whose writes are not echoed back.
pub fn open_quiet_loopback(mode: TransportMode) -> (PortTransport, LoopbackHandle) {
    let (port, peer) = open_loopback(mode);
    peer.set_echo(false);
    (port, peer)
}

/// Run `check` once per transfer mode.
pub fn both_modes(check: impl Fn(TransportMode)) {
    for mode in [TransportMode::Blocking, TransportMode::EventDriven] {
        check(mode);
    }
}
