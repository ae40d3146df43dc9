//! Calibration law and raw-code to physical-unit conversion.
//!
//! The chip scales each RMS path by `0.75 + 0.125 * (code / 2048)` where `code` is the 12-bit
//! calibration field of DSP_CR5..DSP_CR8. Conversions below undo that scaling together with the
//! analog front end (reference, voltage divider, shunt/CT sensitivity and channel gains).

use crate::data_types::CalibrationCoefficients;

/// Samples averaged by [`crate::Stpm34::calibrate`] when the caller has no preference.
pub const DEFAULT_CALIBRATION_SAMPLES: u32 = 200;

const VOLTAGE_FULL_SCALE: f64 = (1u32 << 15) as f64;
const CURRENT_FULL_SCALE: f64 = (1u32 << 17) as f64;

/// Linear gain selected by a calibration code.
pub fn gain_multiplier(code: i16) -> f64 {
    0.125 * (code as f64 / 2048.0) + 0.75
}

/// Analog front-end constants of the metering board.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrontEnd {
    /// ADC reference voltage in volts.
    pub vref: f64,
    /// Upper resistor of the voltage divider, ohms.
    pub r1: f64,
    /// Lower resistor of the voltage divider, ohms.
    pub r2: f64,
    /// Voltage channel gain.
    pub av: f64,
    /// Current channel gain.
    pub ai: f64,
    /// Current sensor sensitivity, V/A.
    pub ks: f64,
    /// Rogowski integrator gain (1.0 when not used).
    pub kint: f64,
}

impl FrontEnd {
    pub const REFERENCE: FrontEnd = FrontEnd {
        vref: 1.18,
        r1: 998_000.0,
        r2: 499.0,
        av: 2.0,
        ai: 2.0,
        ks: 0.031_152_647_97,
        kint: 1.0,
    };

    fn divider(&self) -> f64 {
        1.0 + self.r1 / self.r2
    }

    /// RMS voltage in volts for a 15-bit `vrms` code.
    pub fn voltage_from_code(&self, raw: u32, cal_code: i16) -> f64 {
        raw as f64 * self.vref * self.divider() / (gain_multiplier(cal_code) * self.av * VOLTAGE_FULL_SCALE)
    }

    /// RMS current in amperes for a 17-bit `crms` code.
    pub fn current_from_code(&self, raw: u32, cal_code: i16) -> f64 {
        raw as f64 * self.vref
            / (gain_multiplier(cal_code) * self.ai * CURRENT_FULL_SCALE * self.ks * self.kint)
    }

    /// Derive `(voltage_code, current_code)` so that the averaged raw codes read back as the nominal
    /// physical values.
    ///
    /// `prior_*_cal` are the codes in effect while the averages were taken. Results are truncated
    /// toward zero; a zero average yields a saturated code.
    pub fn derive_calibration(
        &self,
        nominal_voltage: f64,
        nominal_current: f64,
        averaged_voltage_code: f64,
        averaged_current_code: f64,
        prior_voltage_cal: i16,
        prior_current_cal: i16,
    ) -> (i16, i16) {
        let xv = nominal_voltage * self.av * gain_multiplier(prior_voltage_cal) * VOLTAGE_FULL_SCALE
            / (self.vref * self.divider());
        let xi = nominal_current * self.ai * gain_multiplier(prior_current_cal) * self.ks * self.kint
            * CURRENT_FULL_SCALE
            / self.vref;
        (
            code_for_target(xv, averaged_voltage_code),
            code_for_target(xi, averaged_current_code),
        )
    }
}

impl Default for FrontEnd {
    fn default() -> Self {
        Self::REFERENCE
    }
}

fn code_for_target(target: f64, measured_avg: f64) -> i16 {
    (14336.0 * (target / measured_avg) - 12288.0) as i16
}

/// [`FrontEnd::voltage_from_code`] with the reference front end.
pub fn voltage_from_code(raw: u32, cal_code: i16) -> f64 {
    FrontEnd::REFERENCE.voltage_from_code(raw, cal_code)
}

/// [`FrontEnd::current_from_code`] with the reference front end.
pub fn current_from_code(raw: u32, cal_code: i16) -> f64 {
    FrontEnd::REFERENCE.current_from_code(raw, cal_code)
}

/// [`FrontEnd::derive_calibration`] with the reference front end.
pub fn derive_calibration(
    nominal_voltage: f64,
    nominal_current: f64,
    averaged_voltage_code: f64,
    averaged_current_code: f64,
    prior_voltage_cal: i16,
    prior_current_cal: i16,
) -> (i16, i16) {
    FrontEnd::REFERENCE.derive_calibration(
        nominal_voltage,
        nominal_current,
        averaged_voltage_code,
        averaged_current_code,
        prior_voltage_cal,
        prior_current_cal,
    )
}

impl CalibrationCoefficients {
    /// Codes outside the 12-bit field range are truncated when written to the chip.
    pub fn is_in_range(&self) -> bool {
        [
            self.channel1_voltage,
            self.channel1_current,
            self.channel2_voltage,
            self.channel2_current,
        ]
        .iter()
        .all(|c| (0..=0xFFF).contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_boundaries_are_exact() {
        assert_eq!(gain_multiplier(0), 0.75);
        assert_eq!(gain_multiplier(2048), 0.875);
        assert_eq!(gain_multiplier(-2048), 0.625);
    }

    #[test]
    fn derived_code_reproduces_nominal() {
        let fe = FrontEnd::REFERENCE;
        // raw codes a chip calibrated at code 0x800 would report for 230 V / 5 A
        let v_raw = 230.0 * gain_multiplier(0x800) * fe.av * VOLTAGE_FULL_SCALE / (fe.vref * fe.divider());
        let i_raw = 5.0 * gain_multiplier(0x800) * fe.ai * CURRENT_FULL_SCALE * fe.ks / fe.vref;
        let (cv, ci) = fe.derive_calibration(230.0, 5.0, v_raw, i_raw, 0x800, 0x800);
        assert!((cv - 0x800).abs() <= 1);
        assert!((ci - 0x800).abs() <= 1);
    }

    #[test]
    fn coefficients_range_check() {
        assert!(CalibrationCoefficients::default().is_in_range());
        let c = CalibrationCoefficients {
            channel2_current: -1,
            ..Default::default()
        };
        assert!(!c.is_in_range());
    }
}
