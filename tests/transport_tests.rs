//! Integration tests for `PortTransport` on the loopback device.
//!
//! Every behavioural check runs against both transfer modes unless it is
//! specific to one of them. Tests follow the Arrange-Act-Assert pattern.

mod common;

use common::{both_modes, loopback_port, open_loopback, open_quiet_loopback, DEVICE, READ_WAIT};
use std::time::{Duration, Instant};
use usb_stream::port::{
    device_path, DataBits, Direction, OpenStatus, Parity, PortError, PortSettings,
    PortTransport, StopBits, TransportMode, FALLBACK_BAUD_RATE,
};

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_open_missing_device_is_invalid_handle() {
        both_modes(|mode| {
            // Arrange: nothing registered under "7"
            let (mut port, _opener, _peer) = loopback_port(mode);

            // Act
            let status = port.open("7");

            // Assert
            assert_eq!(status, OpenStatus::InvalidHandle);
            assert_eq!(status.code(), 1);
            assert!(!port.is_open());
            assert!(matches!(
                port.last_error(),
                Some(PortError::DeviceUnavailable { .. })
            ));
        });
    }

    #[test]
    fn test_open_unplugged_device_is_invalid_handle() {
        both_modes(|mode| {
            let (mut port, opener, _peer) = loopback_port(mode);
            opener.unregister(&device_path(DEVICE));

            assert_eq!(port.open(DEVICE), OpenStatus::InvalidHandle);
            assert!(!port.good());
        });
    }

    #[test]
    fn test_open_close_is_idempotent() {
        both_modes(|mode| {
            let (mut port, _opener, peer) = loopback_port(mode);

            assert_eq!(port.open(DEVICE), OpenStatus::Ok);
            assert!(port.is_open());
            assert!(port.good());
            assert!(peer.is_owned());

            port.close();
            assert!(!port.is_open());
            assert!(!peer.is_owned());

            port.close();
            assert!(!port.is_open());
        });
    }

    #[test]
    fn test_close_on_never_opened_port() {
        let mut port = PortTransport::new(false);
        port.close();
        port.close();
        assert!(!port.is_open());
    }

    #[test]
    fn test_busy_device_is_invalid_handle() {
        both_modes(|mode| {
            let (mut first, opener, _peer) = loopback_port(mode);
            assert_eq!(first.open(DEVICE), OpenStatus::Ok);

            let mut second = PortTransport::with_opener(mode, opener);
            assert_eq!(second.open(DEVICE), OpenStatus::InvalidHandle);
            assert!(first.is_open());
            assert!(!second.is_open());
        });
    }

    #[test]
    fn test_drop_releases_device() {
        both_modes(|mode| {
            let (mut port, opener, peer) = loopback_port(mode);
            assert_eq!(port.open(DEVICE), OpenStatus::Ok);

            drop(port);
            assert!(!peer.is_owned());

            let mut again = PortTransport::with_opener(mode, opener);
            assert_eq!(again.open(DEVICE), OpenStatus::Ok);
        });
    }

    #[test]
    fn test_rejected_configuration_releases_device() {
        both_modes(|mode| {
            let (mut port, _opener, peer) = loopback_port(mode);
            peer.reject_configuration("unsupported line coding");

            let status = port.open(DEVICE);

            assert_eq!(status, OpenStatus::ConfigureFailed);
            assert_eq!(status.code(), 2);
            assert!(!port.is_open());
            assert!(!peer.is_owned());

            // The refusal was one-shot; a retry succeeds.
            assert_eq!(port.open(DEVICE), OpenStatus::Ok);
        });
    }

    #[test]
    fn test_open_purges_stale_input() {
        both_modes(|mode| {
            let (mut port, _opener, peer) = loopback_port(mode);
            peer.inject(b"left over from a previous session");

            assert_eq!(port.open(DEVICE), OpenStatus::Ok);

            assert_eq!(peer.queued(), 0);
            assert!(peer.purge_count() >= 1);
            assert!(!port.is_data_available());
        });
    }

    #[test]
    fn test_event_driven_arms_completion_event() {
        let (mut port, _peer) = open_loopback(TransportMode::EventDriven);
        assert!(port.completion_event().is_some());

        port.close();
        assert!(port.completion_event().is_none());

        let (blocking, _peer) = open_loopback(TransportMode::Blocking);
        assert!(blocking.completion_event().is_none());
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unsupported_baud_falls_back_after_open() {
        both_modes(|mode| {
            // Arrange
            let (mut port, _opener, peer) = loopback_port(mode);
            port.configure_port(99_999, 8, 0, 1, 0);

            // Act
            let status = port.open(DEVICE);

            // Assert
            assert_eq!(status, OpenStatus::Ok);
            let applied = peer.applied_settings().expect("settings applied at open");
            assert_eq!(applied.baud_rate.get(), FALLBACK_BAUD_RATE);
            assert_eq!(applied.baud_rate.get(), 115_200);
        });
    }

    #[test]
    fn test_reopen_applies_new_settings() {
        both_modes(|mode| {
            let (mut port, peer) = open_loopback(mode);
            assert_eq!(peer.applied_settings(), Some(PortSettings::default()));

            port.configure_port(9_600, 7, 2, 2, 0);
            assert_eq!(peer.applied_settings(), Some(PortSettings::default()));

            assert_eq!(port.open(DEVICE), OpenStatus::Ok);
            let applied = peer.applied_settings().expect("settings applied at reopen");
            assert_eq!(applied.baud_rate.get(), 9_600);
            assert_eq!(applied.data_bits, DataBits::Seven);
            assert_eq!(applied.parity, Parity::Even);
            assert_eq!(applied.stop_bits, StopBits::Two);
        });
    }

    #[test]
    fn test_garbage_codes_never_fail() {
        let (mut port, _opener, peer) = loopback_port(TransportMode::Blocking);
        port.configure_port(-1, 42, 9, 0, 17);

        assert_eq!(port.open(DEVICE), OpenStatus::Ok);
        assert_eq!(peer.applied_settings(), Some(PortSettings::default()));
    }

    #[test]
    fn test_event_driven_stores_but_ignores_timeouts() {
        let (mut port, _peer) = open_loopback(TransportMode::EventDriven);
        port.set_timeouts(5.0, 500.0, 2.0, 500.0, 2.0);

        assert_eq!(port.timeouts().read_total_constant, 500.0);

        // An empty read still returns immediately.
        let started = Instant::now();
        let mut buffer = [0u8; 8];
        assert_eq!(port.read(&mut buffer), 0);
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}

// ============================================================================
// Data transfer
// ============================================================================

mod transfer_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_then_read_round_trip() {
        both_modes(|mode| {
            for len in [0usize, 1, 2, 17, 64] {
                // Arrange
                let (mut port, _peer) = open_loopback(mode);
                let payload: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
                let mut buffer = vec![0u8; len];

                // Act
                let written = port.write(&payload);
                let read = port.read(&mut buffer);

                // Assert
                assert_eq!(written, len, "{mode:?} write of {len} bytes");
                assert_eq!(read, len, "{mode:?} read of {len} bytes");
                assert_eq!(buffer, payload);
            }
        });
    }

    #[test]
    fn test_read_timeout_round_trip() {
        both_modes(|mode| {
            let (mut port, _peer) = open_loopback(mode);
            port.write(b"\xf7\x7b\x00\x00");

            let mut buffer = [0u8; 4];
            let n = port.read_timeout(&mut buffer, READ_WAIT);

            assert_eq!(n, 4);
            assert_eq!(&buffer, b"\xf7\x7b\x00\x00");
        });
    }

    #[test]
    fn test_drain_read_stops_at_buffer_capacity() {
        both_modes(|mode| {
            let (mut port, peer) = open_quiet_loopback(mode);
            peer.inject(b"abcdefgh");

            let mut buffer = [0u8; 3];
            assert_eq!(port.read(&mut buffer), 3);
            assert_eq!(&buffer, b"abc");
            assert_eq!(peer.queued(), 5);
        });
    }

    #[test]
    fn test_read_timeout_on_empty_queue_returns_zero() {
        both_modes(|mode| {
            let (mut port, _peer) = open_quiet_loopback(mode);
            let mut buffer = [0u8; 16];
            let timeout = Duration::from_millis(30);

            let started = Instant::now();
            let n = port.read_timeout(&mut buffer, timeout);
            let elapsed = started.elapsed();

            assert_eq!(n, 0);
            assert!(elapsed >= timeout, "{mode:?} returned early: {elapsed:?}");
            assert!(elapsed < timeout + Duration::from_millis(500), "{mode:?} overran: {elapsed:?}");
            assert!(port.last_error().is_none());
        });
    }

    #[test]
    fn test_read_timeout_returns_partial_count() {
        both_modes(|mode| {
            let (mut port, peer) = open_quiet_loopback(mode);
            peer.inject(b"xy");

            let mut buffer = [0u8; 8];
            let n = port.read_timeout(&mut buffer, Duration::from_millis(20));

            assert_eq!(n, 2);
            assert_eq!(&buffer[..2], b"xy");
        });
    }

    #[test]
    fn test_read_timeout_sees_late_bytes() {
        both_modes(|mode| {
            let (mut port, peer) = open_quiet_loopback(mode);
            let sender = std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                peer.inject(b"late");
            });

            let mut buffer = [0u8; 4];
            let n = port.read_timeout(&mut buffer, Duration::from_millis(1_000));
            sender.join().unwrap();

            assert_eq!(n, 4);
            assert_eq!(&buffer, b"late");
        });
    }

    #[test]
    fn test_get_one_byte() {
        both_modes(|mode| {
            let (mut port, peer) = open_quiet_loopback(mode);
            peer.inject(&[0x42, 0x43]);

            assert_eq!(port.get_one_byte(READ_WAIT), Some(0x42));
            assert_eq!(port.get_one_byte(READ_WAIT), Some(0x43));
            assert_eq!(port.get_one_byte(Duration::from_millis(5)), None);
            assert!(port.last_error().is_none());
        });
    }

    #[test]
    fn test_data_available_tracks_queue() {
        both_modes(|mode| {
            let (mut port, peer) = open_quiet_loopback(mode);
            assert!(!port.is_data_available());

            peer.inject(b"!");
            assert!(port.is_data_available());

            port.clear_buffer();
            assert!(!port.is_data_available());
            assert_eq!(peer.queued(), 0);
        });
    }

    #[test]
    fn test_closed_port_is_a_safe_noop() {
        both_modes(|mode| {
            let (mut port, _opener, peer) = loopback_port(mode);
            let mut buffer = [0u8; 4];

            assert_eq!(port.write(b"abc"), 0);
            assert_eq!(port.read(&mut buffer), 0);
            assert_eq!(port.read_timeout(&mut buffer, Duration::from_millis(1)), 0);
            assert_eq!(port.get_one_byte(Duration::from_millis(1)), None);
            assert!(!port.is_data_available());
            port.clear_buffer();

            assert_eq!(peer.write_attempts(), 0);
            assert!(matches!(port.last_error(), Some(PortError::NotOpen)));
        });
    }
}

// ============================================================================
// Mode-specific behaviour
// ============================================================================

mod mode_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_driven_purges_after_lone_byte() {
        let (mut port, peer) = open_quiet_loopback(TransportMode::EventDriven);
        let purges = peer.purge_count();
        peer.inject(b"z");

        let mut buffer = [0u8; 8];
        assert_eq!(port.read(&mut buffer), 1);
        assert_eq!(buffer[0], b'z');
        assert_eq!(peer.purge_count(), purges + 1);
    }

    #[test]
    fn test_blocking_never_purges_on_read() {
        let (mut port, peer) = open_quiet_loopback(TransportMode::Blocking);
        let purges = peer.purge_count();
        peer.inject(b"z");

        let mut buffer = [0u8; 8];
        assert_eq!(port.read(&mut buffer), 1);
        assert_eq!(port.read(&mut buffer), 0);
        assert_eq!(peer.purge_count(), purges);
    }

    #[test]
    fn test_event_driven_empty_read_leaves_pending() {
        let (mut port, peer) = open_quiet_loopback(TransportMode::EventDriven);
        let mut buffer = [0u8; 4];

        assert_eq!(port.read(&mut buffer), 0);
        assert!(port.has_pending(Direction::Read));

        peer.inject(b"ok");
        assert_eq!(port.read(&mut buffer), 2);
        assert!(!port.has_pending(Direction::Read));
    }

    #[test]
    fn test_event_driven_write_is_byte_by_byte() {
        let (mut port, peer) = open_quiet_loopback(TransportMode::EventDriven);

        assert_eq!(port.write(b"abc"), 3);

        assert_eq!(peer.write_log(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(port.completion_event().is_some_and(|e| e.is_set()));
    }

    #[test]
    fn test_blocking_write_is_one_call() {
        let (mut port, peer) = open_quiet_loopback(TransportMode::Blocking);

        assert_eq!(port.write(b"abc"), 3);
        assert_eq!(peer.write_log(), vec![b"abc".to_vec()]);
    }

    #[test]
    fn test_event_driven_retries_stalled_write() {
        let (mut port, peer) = open_quiet_loopback(TransportMode::EventDriven);
        peer.stall_writes(3);

        assert_eq!(port.write(b"q"), 1);
        assert_eq!(peer.write_attempts(), 4);
        assert_eq!(peer.written(), b"q");
    }

    #[test]
    fn test_event_driven_write_gives_up_with_io_fault() {
        let (mut port, peer) = open_quiet_loopback(TransportMode::EventDriven);
        peer.stall_writes(usize::MAX);

        let result = port.try_write(b"q");

        assert!(matches!(result, Err(PortError::IoFault(_))));
        assert_eq!(port.write(b"q"), 0);
        assert!(matches!(port.last_error(), Some(PortError::IoFault(_))));
        assert!(!port.has_pending(Direction::Write));
    }

    #[test]
    fn test_hard_write_failure_is_recorded() {
        both_modes(|mode| {
            let (mut port, peer) = open_quiet_loopback(mode);
            peer.fail_writes("cable pulled");

            assert_eq!(port.write(b"data"), 0);
            let err = port.take_last_error().expect("failure recorded");
            assert!(!err.is_timeout(), "{mode:?}: {err}");

            peer.clear_faults();
            assert_eq!(port.write(b"data"), 4);
            assert!(port.last_error().is_none());
        });
    }
}

// ============================================================================
// Error channel
// ============================================================================

mod error_channel_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_try_read_distinguishes_timeout_from_fault() {
        both_modes(|mode| {
            let (mut port, _peer) = open_quiet_loopback(mode);
            let mut buffer = [0u8; 2];

            let timed_out = port.try_read_timeout(&mut buffer, Duration::from_millis(2));
            assert_eq!(timed_out.unwrap(), 0);

            port.close();
            let closed = port.try_read_timeout(&mut buffer, Duration::from_millis(2));
            assert!(matches!(closed, Err(PortError::NotOpen)));
        });
    }

    #[test]
    fn test_success_clears_last_error() {
        let (mut port, _opener, _peer) = loopback_port(TransportMode::Blocking);
        assert_eq!(port.write(b"x"), 0);
        assert!(port.last_error().is_some());

        assert_eq!(port.open(DEVICE), OpenStatus::Ok);
        assert!(port.last_error().is_none());
    }
}

// ============================================================================
// Receive notification and cancellation
// ============================================================================

mod notification_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn test_arriving_bytes_set_completion_event() {
        // Arrange: an empty drain read, then a clean event
        let (mut port, peer) = open_quiet_loopback(TransportMode::EventDriven);
        let mut buffer = [0u8; 4];
        assert_eq!(port.read(&mut buffer), 0);
        let event = port.completion_event().unwrap();
        event.reset();

        // Act
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            peer.inject(b"x");
        });

        // Assert
        assert!(event.wait_timeout(READ_WAIT));
        writer.join().unwrap();
        assert_eq!(port.read(&mut buffer), 1);
        assert_eq!(buffer[0], b'x');
    }

    #[test]
    fn test_notification_armed_only_while_event_driven_port_is_open() {
        let (mut port, peer) = open_loopback(TransportMode::EventDriven);
        assert!(peer.notifies_on_receive());

        port.close();
        assert!(!peer.notifies_on_receive());

        let (_port, peer) = open_loopback(TransportMode::Blocking);
        assert!(!peer.notifies_on_receive());
    }

    #[test]
    fn test_notification_failure_does_not_fail_open() {
        let (mut port, _opener, peer) = loopback_port(TransportMode::EventDriven);
        peer.fail_notifications("no event mask");

        assert_eq!(port.open(DEVICE), OpenStatus::Ok);
        assert!(port.completion_event().is_some());
        assert!(port.last_error().is_none());
    }

    #[test]
    fn test_unbounded_timeout_returns_queued_byte() {
        both_modes(|mode| {
            let (mut port, peer) = open_quiet_loopback(mode);
            peer.inject(&[0x7b]);

            assert_eq!(port.get_one_byte(Duration::MAX), Some(0x7b));
            assert!(port.last_error().is_none());
        });
    }

    #[test]
    fn test_abort_from_another_thread_ends_long_read() {
        both_modes(|mode| {
            let (mut port, _peer) = open_quiet_loopback(mode);
            let abort = port.abort_handle();

            let aborter = thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                abort.abort();
            });

            let started = Instant::now();
            let mut buffer = [0u8; 8];
            let n = port.read_timeout(&mut buffer, Duration::from_secs(5));

            assert_eq!(n, 0);
            assert!(started.elapsed() < Duration::from_secs(1));
            aborter.join().unwrap();
        });
    }

    #[test]
    fn test_reopen_clears_abort() {
        let (mut port, peer) = open_quiet_loopback(TransportMode::Blocking);
        port.abort_handle().abort();
        assert_eq!(port.open(DEVICE), OpenStatus::Ok);
        assert!(!port.abort_handle().is_aborted());

        peer.inject(b"ok");
        let mut buffer = [0u8; 2];
        assert_eq!(port.read_timeout(&mut buffer, READ_WAIT), 2);
        assert_eq!(&buffer, b"ok");
    }
}
