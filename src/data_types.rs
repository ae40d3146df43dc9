//! Data types for the STPM34 driver.

use crate::registers::{CONTROL_REGISTERS, Control, RegisterDef};

/// Nominal mains frequency, DSP_CR3 `ref_freq`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LineFrequency {
    #[default]
    F50Hz = 0,
    F60Hz = 1,
}

/// Current channel analog gain, DFE_CRx `gain`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CurrentGain {
    #[default]
    X2 = 0,
    X4 = 1,
    X8 = 2,
    X16 = 3,
}

impl CurrentGain {
    pub fn from_code(code: u32) -> Self {
        match code & 0b11 {
            0 => CurrentGain::X2,
            1 => CurrentGain::X4,
            2 => CurrentGain::X8,
            _ => CurrentGain::X16,
        }
    }

    pub fn factor(self) -> u32 {
        2 << (self as u32)
    }
}

/// Measurement channels addressed by a latch request.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Channels {
    pub channel1: bool,
    pub channel2: bool,
}

impl Channels {
    pub const NONE: Channels = Channels {
        channel1: false,
        channel2: false,
    };
    pub const BOTH: Channels = Channels {
        channel1: true,
        channel2: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.channel1 && !self.channel2
    }
}

/// Raw RMS codes of both channels, as packed in DSP_REG14/DSP_REG15.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RmsSnapshot {
    /// 15-bit code.
    pub channel1_voltage_code: u16,
    /// 17-bit code.
    pub channel1_current_code: u32,
    pub channel2_voltage_code: u16,
    pub channel2_current_code: u32,
}

/// Voltage (V) and current (A) of one channel.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelReading {
    pub voltage: f64,
    pub current: f64,
}

/// Physical readings of both channels taken from one latched snapshot.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Measurement {
    pub channel1: ChannelReading,
    pub channel2: ChannelReading,
    /// Set when the latch handshake timed out and the values may straddle a measurement boundary.
    pub stale: bool,
}

impl Measurement {
    /// `(v1, i1, v2, i2)`.
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (
            self.channel1.voltage,
            self.channel1.current,
            self.channel2.voltage,
            self.channel2.current,
        )
    }
}

/// What to do when the latch handshake times out during a measurement.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LatchPolicy {
    /// Fail with [`crate::Error::LatchTimeout`].
    #[default]
    Require,
    /// Read the data registers anyway and flag the result as stale.
    AllowStale,
}

/// The four calibration codes (DSP_CR5..DSP_CR8 `calibration`), applied and persisted together.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CalibrationCoefficients {
    pub channel1_voltage: i16,
    pub channel1_current: i16,
    pub channel2_voltage: i16,
    pub channel2_current: i16,
}

impl Default for CalibrationCoefficients {
    /// Chip reset value 0x800 on all four.
    fn default() -> Self {
        Self {
            channel1_voltage: 0x800,
            channel1_current: 0x800,
            channel2_voltage: 0x800,
            channel2_current: 0x800,
        }
    }
}

/// Control registers whose read-back differed from the intended value after a bulk write.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConfigDrift {
    mismatched: u32,
}

impl ConfigDrift {
    pub(crate) fn mark(&mut self, def: &RegisterDef<Control>) {
        self.mismatched |= 1 << def.index();
    }

    pub fn is_clean(&self) -> bool {
        self.mismatched == 0
    }

    pub fn contains(&self, def: &RegisterDef<Control>) -> bool {
        self.mismatched & (1 << def.index()) != 0
    }

    pub fn len(&self) -> usize {
        self.mismatched.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.is_clean()
    }

    /// Definitions of the mismatched registers, in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &'static RegisterDef<Control>> + '_ {
        CONTROL_REGISTERS
            .into_iter()
            .filter(move |def| self.contains(def))
    }
}
