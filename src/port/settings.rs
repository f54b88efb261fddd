//! Line settings and timeout policy.
//!
//! Every field has a total mapping from the integer codes callers pass to
//! `configure_port`: an unrecognised value falls back to a documented default
//! instead of failing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Baud rate used when a requested rate is not in [`SUPPORTED_BAUD_RATES`].
pub const FALLBACK_BAUD_RATE: u32 = 115_200;

/// Baud rates the transport accepts as-is.
pub const SUPPORTED_BAUD_RATES: [u32; 30] = [
    50, 75, 110, 134, 150, 200, 300, 600, 1_200, 1_800, 2_400, 4_800, 9_600, 19_200, 38_400,
    57_600, 115_200, 230_400, 460_800, 500_000, 576_000, 921_600, 1_000_000, 1_152_000,
    1_500_000, 2_000_000, 2_500_000, 3_000_000, 3_500_000, 4_000_000,
];

/// A baud rate from the supported set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", from = "i64")]
pub struct BaudRate(u32);

impl BaudRate {
    /// Map any integer onto a supported rate, falling back to 115200.
    pub fn from_code(code: i64) -> Self {
        match u32::try_from(code) {
            Ok(rate) if SUPPORTED_BAUD_RATES.contains(&rate) => Self(rate),
            _ => Self(FALLBACK_BAUD_RATE),
        }
    }

    /// Bits per second.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self(FALLBACK_BAUD_RATE)
    }
}

impl From<i64> for BaudRate {
    fn from(code: i64) -> Self {
        Self::from_code(code)
    }
}

impl From<BaudRate> for u32 {
    fn from(rate: BaudRate) -> Self {
        rate.0
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    /// 5..=8 map directly; anything else is the platform default width.
    pub fn from_code(code: i64) -> Self {
        match code {
            5 => Self::Five,
            6 => Self::Six,
            7 => Self::Seven,
            8 => Self::Eight,
            _ => Self::default(),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

impl FlowControl {
    /// 0 = none, 1 = software, 2 = hardware; anything else is none.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Software,
            2 => Self::Hardware,
            _ => Self::None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Software => 1,
            Self::Hardware => 2,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// 0 = none, 1 = odd, 2 = even; anything else is none.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Odd,
            2 => Self::Even,
            _ => Self::None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Odd => 1,
            Self::Even => 2,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl StopBits {
    /// 2 is two stop bits; anything else is one.
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => Self::Two,
            _ => Self::One,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Line coding applied to the device at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortSettings {
    pub baud_rate: BaudRate,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl PortSettings {
    /// Build settings from raw integer codes. Never fails.
    pub fn from_codes(baud: i64, char_size: i64, parity: i64, stop_bits: i64, flow: i64) -> Self {
        Self {
            baud_rate: BaudRate::from_code(baud),
            data_bits: DataBits::from_code(char_size),
            parity: Parity::from_code(parity),
            stop_bits: StopBits::from_code(stop_bits),
            flow_control: FlowControl::from_code(flow),
        }
    }
}

/// Timeout policy in milliseconds.
///
/// The fields follow the classic comm-timeout layout: a read is bounded by
/// `read_total_constant + read_total_multiplier * len`, a write by
/// `write_total_constant + write_total_multiplier * len`. `read_interval`
/// bounds the gap between two received bytes and is used on its own when both
/// read totals are zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub read_interval: f64,
    pub read_total_constant: f64,
    pub read_total_multiplier: f64,
    pub write_total_constant: f64,
    pub write_total_multiplier: f64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_interval: 1.0,
            read_total_constant: 1.0,
            read_total_multiplier: 0.0,
            write_total_constant: 1.0,
            write_total_multiplier: 1.0,
        }
    }
}

impl Timeouts {
    /// Bound for reading `len` bytes.
    pub fn read_budget(&self, len: usize) -> Duration {
        let total = self.read_total_constant + self.read_total_multiplier * len as f64;
        if total > 0.0 {
            millis(total)
        } else {
            millis(self.read_interval)
        }
    }

    /// Bound for writing `len` bytes.
    pub fn write_budget(&self, len: usize) -> Duration {
        millis(self.write_total_constant + self.write_total_multiplier * len as f64)
    }
}

/// Convert fractional milliseconds into a duration at microsecond resolution;
/// negative or non-finite is zero.
pub fn millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_micros((ms * 1000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}
