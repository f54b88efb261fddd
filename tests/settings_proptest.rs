//! Property tests for the integer-code mapping behind `configure_port`.

use proptest::prelude::*;
use usb_stream::port::{
    BaudRate, DataBits, FlowControl, LoopbackOpener, OpenStatus, Parity, PortSettings,
    PortTransport, StopBits, TransportMode, FALLBACK_BAUD_RATE, SUPPORTED_BAUD_RATES,
};

fn supported_baud() -> impl Strategy<Value = i64> {
    proptest::sample::select(SUPPORTED_BAUD_RATES.to_vec()).prop_map(i64::from)
}

proptest! {
    #[test]
    fn supported_baud_is_kept(baud in supported_baud()) {
        prop_assert_eq!(i64::from(BaudRate::from_code(baud).get()), baud);
    }

    #[test]
    fn any_baud_maps_into_supported_set(baud in any::<i64>()) {
        let rate = BaudRate::from_code(baud).get();
        prop_assert!(SUPPORTED_BAUD_RATES.contains(&rate));
        if i64::from(rate) != baud {
            prop_assert_eq!(rate, FALLBACK_BAUD_RATE);
        }
    }

    #[test]
    fn every_field_is_exact_or_fallback(
        char_size in any::<i64>(),
        parity in any::<i64>(),
        stop_bits in any::<i64>(),
        flow in any::<i64>(),
    ) {
        let settings = PortSettings::from_codes(115_200, char_size, parity, stop_bits, flow);

        let data_bits = settings.data_bits;
        prop_assert!(data_bits.code() == char_size || data_bits == DataBits::Eight);

        let p = settings.parity;
        prop_assert!(p.code() == parity || p == Parity::None);

        let s = settings.stop_bits;
        prop_assert!(s.code() == stop_bits || s == StopBits::One);

        let f = settings.flow_control;
        prop_assert!(f.code() == flow || f == FlowControl::None);
    }

    #[test]
    fn configure_port_never_prevents_open(
        baud in any::<i64>(),
        char_size in -2i64..12,
        parity in -2i64..5,
        stop_bits in -2i64..5,
        flow in -2i64..5,
    ) {
        let opener = LoopbackOpener::new();
        let peer = opener.register(usb_stream::port::device_path("0"));
        let mut port = PortTransport::with_opener(TransportMode::Blocking, opener);

        port.configure_port(baud, char_size, parity, stop_bits, flow);
        prop_assert_eq!(port.open("0"), OpenStatus::Ok);

        let expected = PortSettings::from_codes(baud, char_size, parity, stop_bits, flow);
        prop_assert_eq!(peer.applied_settings(), Some(expected));
    }
}
