//! Typed device configuration folded into, or read out of, the control bank.

use crate::data_types::{CalibrationCoefficients, CurrentGain, LineFrequency};
use crate::error::UnknownField;
use crate::registers::{
    ControlBank, DFE_CR1, DFE_CR2, DSP_CR3, DSP_CR4, DSP_CR5, DSP_CR6, DSP_CR7, DSP_CR8, US_REG1,
};

/// Settings of one metering channel.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelConfiguration {
    pub current_gain: CurrentGain,
    /// 2-bit voltage phase compensation.
    pub voltage_phase_comp: u8,
    /// 10-bit current phase compensation.
    pub current_phase_comp: u16,
    pub voltage_calibration: i16,
    pub current_calibration: i16,
    /// 10-bit; 0x3FF disables swell detection.
    pub voltage_swell_threshold: u16,
    /// 10-bit; 0 disables sag detection.
    pub voltage_sag_threshold: u16,
    /// 10-bit; 0x3FF disables swell detection.
    pub current_swell_threshold: u16,
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            current_gain: CurrentGain::default(),
            voltage_phase_comp: 0,
            current_phase_comp: 0,
            voltage_calibration: 0x800,
            current_calibration: 0x800,
            voltage_swell_threshold: 0x3FF,
            voltage_sag_threshold: 0,
            current_swell_threshold: 0x3FF,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StpmConfiguration {
    pub line_frequency: LineFrequency,
    pub channels: [ChannelConfiguration; 2],
    /// Drive the zero-crossing / clock output pin.
    pub zero_crossing_output: bool,
    /// CRC-8 byte on every frame.
    pub crc: bool,
}

impl Default for StpmConfiguration {
    fn default() -> Self {
        Self {
            line_frequency: LineFrequency::default(),
            channels: [ChannelConfiguration::default(); 2],
            zero_crossing_output: false,
            crc: true,
        }
    }
}

pub(crate) fn code_to_field(code: i16) -> u32 {
    code as u16 as u32
}

pub(crate) fn field_to_code(value: u32) -> i16 {
    value as i16
}

impl StpmConfiguration {
    pub fn calibration(&self) -> CalibrationCoefficients {
        let [ch1, ch2] = &self.channels;
        CalibrationCoefficients {
            channel1_voltage: ch1.voltage_calibration,
            channel1_current: ch1.current_calibration,
            channel2_voltage: ch2.voltage_calibration,
            channel2_current: ch2.current_calibration,
        }
    }

    /// Write these settings into `bank`, leaving fields they do not cover untouched.
    pub fn apply_to(&self, bank: &mut ControlBank) -> Result<(), UnknownField> {
        let cr3 = bank.get_mut(&DSP_CR3);
        cr3.set("ref_freq", self.line_frequency as u32)?;
        cr3.set("zcr_en", self.zero_crossing_output as u32)?;

        let [ch1, ch2] = &self.channels;
        let cr4 = bank.get_mut(&DSP_CR4);
        cr4.set("primary_current_phase", ch1.current_phase_comp as u32)?;
        cr4.set("primary_voltage_phase", ch1.voltage_phase_comp as u32)?;
        cr4.set("secondary_current_phase", ch2.current_phase_comp as u32)?;
        cr4.set("secondary_voltage_phase", ch2.voltage_phase_comp as u32)?;

        let per_channel = [(ch1, &DSP_CR5, &DSP_CR6, &DFE_CR1), (ch2, &DSP_CR7, &DSP_CR8, &DFE_CR2)];
        for (ch, voltage_reg, current_reg, dfe_reg) in per_channel {
            let v = bank.get_mut(voltage_reg);
            v.set("calibration", code_to_field(ch.voltage_calibration))?;
            v.set("swell_thr", ch.voltage_swell_threshold as u32)?;
            v.set("sag_thr", ch.voltage_sag_threshold as u32)?;

            let c = bank.get_mut(current_reg);
            c.set("calibration", code_to_field(ch.current_calibration))?;
            c.set("swell_thr", ch.current_swell_threshold as u32)?;

            bank.get_mut(dfe_reg).set("gain", ch.current_gain as u32)?;
        }

        bank.get_mut(&US_REG1).set("crc_en", self.crc as u32)?;
        Ok(())
    }

    /// Settings as currently held in `bank`.
    pub fn from_bank(bank: &ControlBank) -> Result<Self, UnknownField> {
        let cr3 = bank.get(&DSP_CR3);
        let line_frequency = if cr3.get("ref_freq")? == 0 {
            LineFrequency::F50Hz
        } else {
            LineFrequency::F60Hz
        };
        let cr4 = bank.get(&DSP_CR4);
        let phases = [
            (cr4.get("primary_voltage_phase")?, cr4.get("primary_current_phase")?),
            (cr4.get("secondary_voltage_phase")?, cr4.get("secondary_current_phase")?),
        ];

        let mut channels = [ChannelConfiguration::default(); 2];
        let regs = [(&DSP_CR5, &DSP_CR6, &DFE_CR1), (&DSP_CR7, &DSP_CR8, &DFE_CR2)];
        for ((ch, (voltage_reg, current_reg, dfe_reg)), (vphase, cphase)) in
            channels.iter_mut().zip(regs).zip(phases)
        {
            let v = bank.get(voltage_reg);
            let c = bank.get(current_reg);
            *ch = ChannelConfiguration {
                current_gain: CurrentGain::from_code(bank.get(dfe_reg).get("gain")?),
                voltage_phase_comp: vphase as u8,
                current_phase_comp: cphase as u16,
                voltage_calibration: field_to_code(v.get("calibration")?),
                current_calibration: field_to_code(c.get("calibration")?),
                voltage_swell_threshold: v.get("swell_thr")? as u16,
                voltage_sag_threshold: v.get("sag_thr")? as u16,
                current_swell_threshold: c.get("swell_thr")? as u16,
            };
        }

        Ok(Self {
            line_frequency,
            channels,
            zero_crossing_output: cr3.get("zcr_en")? != 0,
            crc: bank.get(&US_REG1).get("crc_en")? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_chip_reset() {
        // channel 1 resets to gain x16; the default configuration selects x2 like channel 2
        let mut bank = ControlBank::new();
        StpmConfiguration::default().apply_to(&mut bank).unwrap();
        let reset = ControlBank::new();
        for (applied, original) in bank.iter().zip(reset.iter()) {
            if applied.address() == DFE_CR1.address() {
                assert_eq!(applied.get("gain").unwrap(), 0);
                assert_eq!(applied.encode(), original.encode() & !(0b11 << 26));
            } else {
                assert_eq!(applied, original, "{}", applied.name());
            }
        }
    }

    #[test]
    fn apply_then_read_back() {
        let mut cfg = StpmConfiguration::default();
        cfg.line_frequency = LineFrequency::F60Hz;
        cfg.crc = false;
        cfg.channels[1].current_gain = CurrentGain::X16;
        cfg.channels[0].current_phase_comp = 0x155;
        cfg.channels[1].voltage_calibration = 0x7AB;

        let mut bank = ControlBank::new();
        cfg.apply_to(&mut bank).unwrap();
        assert_eq!(bank.get(&DSP_CR4).encode(), 0x155 << 12);
        assert_eq!(bank.get(&DSP_CR7).get("calibration").unwrap(), 0x7AB);
        assert_eq!(StpmConfiguration::from_bank(&bank).unwrap(), cfg);
    }
}
