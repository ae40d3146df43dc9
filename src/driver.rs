//! Driver for one STPM34.
//!
//! Every frame on the wire is `[read_address, write_address, data_lsb, data_msb]`, followed by a
//! CRC-8 byte when `crc_en` is set in US_REG1. The chip accepts 16 bits of payload per frame, so a
//! 32-bit register write is two frames: the upper half-word at `address + 1`, then the lower at
//! `address`. Reads put the register address in the read slot and `0xFF` everywhere else.

use core::sync::atomic::{AtomicBool, Ordering};

use crc::{CRC_8_SMBUS, Crc};
use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};

use crate::calibration::FrontEnd;
use crate::configuration::{StpmConfiguration, code_to_field};
use crate::data_types::{
    CalibrationCoefficients, ChannelReading, Channels, ConfigDrift, LatchPolicy, Measurement, RmsSnapshot,
};
use crate::error::{Error, UnknownField};
use crate::latch::{LatchBudget, LatchHandshake, LatchState};
use crate::registers::{
    CONTROL_REGISTERS, Control, ControlBank, DSP_CR3, DSP_CR5, DSP_CR6, DSP_CR7, DSP_CR8, DSP_REG1, DSP_REG14,
    DSP_REG15, DSP_SR1, DSP_SR2, Data, DataBank, DspStatus, Register, RegisterDef, US_REG1, US_REG3,
};
use crate::transport::{MAX_FRAME, Transport};

/// CRC-8, polynomial 0x07, initial value 0, MSB first.
pub const CRC_STPM: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// CRC byte the chip expects after (and appends to) a 4-byte frame.
pub fn crc8(bytes: &[u8]) -> u8 {
    CRC_STPM.checksum(bytes)
}

/// Write-address slot value meaning "no write in this frame".
const NO_WRITE: u8 = 0xFF;

const LAST_CONTROL_ADDRESS: u8 = US_REG3.address();

/// Status registers hold live event flags and are left out of drift detection.
const VOLATILE: [&RegisterDef<Control>; 2] = [&DSP_SR1, &DSP_SR2];

struct Frame {
    bytes: [u8; MAX_FRAME],
    expected: usize,
    received: usize,
    crc: bool,
}

impl Frame {
    fn word<E>(&self) -> Result<u32, Error<E>> {
        if self.received != self.expected {
            return Err(Error::ShortReply {
                expected: self.expected,
                received: self.received,
            });
        }
        if self.crc {
            let calculated = crc8(&self.bytes[..4]);
            if calculated != self.bytes[4] {
                return Err(Error::CrcMismatch {
                    expected: calculated,
                    received: self.bytes[4],
                });
            }
        }
        Ok(u32::from_le_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]))
    }
}

/// STPM34 driver.
///
/// Keeps two copies of the control bank: the intended configuration, which is what gets written,
/// and the last state read back from the chip.
pub struct Stpm34<T, D> {
    transport: T,
    delay: D,
    front_end: FrontEnd,
    latch_budget: LatchBudget,
    control: ControlBank,
    readback: ControlBank,
    data: DataBank,
    drift_reported: bool,
}

impl<T, D> Stpm34<T, D> {
    /// Create a driver with all banks at their reset values. No bus traffic.
    pub fn new(transport: T, delay: D) -> Self {
        Self::with_front_end(transport, delay, FrontEnd::default())
    }

    /// Like [`Stpm34::new`], with board-specific analog constants for the conversions.
    pub fn with_front_end(transport: T, delay: D, front_end: FrontEnd) -> Self {
        Self {
            transport,
            delay,
            front_end,
            latch_budget: LatchBudget::default(),
            control: ControlBank::new(),
            readback: ControlBank::new(),
            data: DataBank::new(),
            drift_reported: false,
        }
    }

    /// Consume the driver and return the transport and delay.
    pub fn release(self) -> (T, D) {
        (self.transport, self.delay)
    }

    /// Analog constants used by [`Stpm34::convert`].
    pub fn front_end(&self) -> &FrontEnd {
        &self.front_end
    }

    /// Budget applied by [`Stpm34::read_both_channels`] and [`Stpm34::calibrate`].
    pub fn latch_budget(&self) -> &LatchBudget {
        &self.latch_budget
    }

    /// Replace the latch budget used by the measurement and calibration helpers.
    pub fn set_latch_budget(&mut self, budget: LatchBudget) {
        self.latch_budget = budget;
    }

    /// Intended value of a control register.
    pub fn control(&self, def: &RegisterDef<Control>) -> &Register<Control> {
        self.control.get(def)
    }

    /// Mutable intended value; takes effect on the next write of that register.
    pub fn control_mut(&mut self, def: &RegisterDef<Control>) -> &mut Register<Control> {
        self.control.get_mut(def)
    }

    /// Last value read back from the chip.
    pub fn readback(&self, def: &RegisterDef<Control>) -> &Register<Control> {
        self.readback.get(def)
    }

    /// Last value read of a data register.
    pub fn data(&self, def: &RegisterDef<Data>) -> &Register<Data> {
        self.data.get(def)
    }

    /// Every intended control register, in catalog order.
    pub fn control_bank(&self) -> &ControlBank {
        &self.control
    }

    /// Every control register as last read back, in catalog order.
    pub fn readback_bank(&self) -> &ControlBank {
        &self.readback
    }

    /// Whether frames carry a CRC byte (intended US_REG1 `crc_en`).
    pub fn crc_enabled(&self) -> bool {
        crc_flag(&self.control)
    }

    /// Typed view of the intended configuration.
    pub fn configuration(&self) -> Result<StpmConfiguration, UnknownField> {
        StpmConfiguration::from_bank(&self.control)
    }

    /// Calibration codes currently held in the intended configuration.
    pub fn calibration(&self) -> Result<CalibrationCoefficients, UnknownField> {
        Ok(self.configuration()?.calibration())
    }

    /// Convert raw RMS codes using the intended calibration codes of each channel.
    pub fn convert(&self, snapshot: &RmsSnapshot) -> Result<Measurement, UnknownField> {
        let cal = self.calibration()?;
        let fe = &self.front_end;
        Ok(Measurement {
            channel1: ChannelReading {
                voltage: fe.voltage_from_code(snapshot.channel1_voltage_code as u32, cal.channel1_voltage),
                current: fe.current_from_code(snapshot.channel1_current_code, cal.channel1_current),
            },
            channel2: ChannelReading {
                voltage: fe.voltage_from_code(snapshot.channel2_voltage_code as u32, cal.channel2_voltage),
                current: fe.current_from_code(snapshot.channel2_current_code, cal.channel2_current),
            },
            stale: false,
        })
    }
}

fn crc_flag(bank: &ControlBank) -> bool {
    bank.get(&US_REG1).get("crc_en").unwrap_or(1) != 0
}

impl<T, D> Stpm34<T, D>
where
    T: Transport,
    D: DelayNs,
{
    /// CRC framing to use for the next frame; warns once when it disagrees with the chip.
    fn crc_framing(&mut self) -> bool {
        let intended = crc_flag(&self.control);
        let device = crc_flag(&self.readback);
        if intended != device {
            if !self.drift_reported {
                warn!(
                    "stpm crc framing {} locally but last read back {} on the device",
                    if intended { "enabled" } else { "disabled" },
                    if device { "enabled" } else { "disabled" },
                );
                self.drift_reported = true;
            }
        } else {
            self.drift_reported = false;
        }
        intended
    }

    fn exchange(&mut self, read_address: u8, write_address: u8, lsb: u8, msb: u8) -> Result<Frame, Error<T::Error>> {
        let crc = self.crc_framing();
        let len = if crc { 5 } else { 4 };
        let mut request = [read_address, write_address, lsb, msb, 0];
        if crc {
            request[4] = crc8(&request[..4]);
        }
        trace!("stpm tx {:02X?}", &request[..len]);

        let mut bytes = [0u8; MAX_FRAME];
        let received = self
            .transport
            .exchange(&request[..len], &mut bytes[..len])
            .map_err(Error::Transport)?;
        trace!("stpm rx {:02X?}", &bytes[..received.min(len)]);

        Ok(Frame {
            bytes,
            expected: len,
            received,
            crc,
        })
    }

    /// Read the 32-bit word at `address`.
    pub fn read_word(&mut self, address: u8) -> Result<u32, Error<T::Error>> {
        let frame = self.exchange(address, NO_WRITE, 0xFF, 0xFF)?;
        frame.word().inspect_err(|e| debug!("stpm read 0x{:02X} failed: {:?}", address, e))
    }

    /// Write a 32-bit word as two half-word frames, upper half first. Replies are not checked.
    ///
    /// `address` must be the even start address of a control register.
    pub fn write_word(&mut self, address: u8, word: u32) -> Result<(), Error<T::Error>> {
        if address > LAST_CONTROL_ADDRESS || address % 2 != 0 {
            return Err(Error::NotWritable { address });
        }
        let [b0, b1, b2, b3] = word.to_le_bytes();
        self.exchange(address, address + 1, b2, b3)?;
        self.exchange(address, address, b0, b1)?;
        Ok(())
    }

    /// Read a register of either bank and decode it in place. Returns the raw word.
    ///
    /// On `ShortReply` or `CrcMismatch` the register keeps its previous contents.
    pub fn read_register<B>(&mut self, reg: &mut Register<B>) -> Result<u32, Error<T::Error>> {
        let word = self.read_word(reg.address())?;
        reg.decode(word);
        Ok(word)
    }

    /// Write a control register. Success means both frames were sent, not that the chip took them.
    pub fn write_register(&mut self, reg: &Register<Control>) -> Result<(), Error<T::Error>> {
        self.write_word(reg.address(), reg.encode())
    }

    /// Write the intended value of one control register.
    pub fn write_control(&mut self, def: &RegisterDef<Control>) -> Result<(), Error<T::Error>> {
        let word = self.control.get(def).encode();
        self.write_word(def.address(), word)
    }

    /// Read one control register into the read-back bank.
    pub fn read_control(&mut self, def: &RegisterDef<Control>) -> Result<&Register<Control>, Error<T::Error>> {
        let word = self.read_word(def.address())?;
        let reg = self.readback.get_mut(def);
        reg.decode(word);
        Ok(reg)
    }

    /// Read one data register into the data bank.
    pub fn read_data(&mut self, def: &RegisterDef<Data>) -> Result<&Register<Data>, Error<T::Error>> {
        let word = self.read_word(def.address())?;
        let reg = self.data.get_mut(def);
        reg.decode(word);
        Ok(reg)
    }

    fn read_back(&mut self) -> Result<(), Error<T::Error>> {
        for def in CONTROL_REGISTERS {
            let word = self.read_control(def)?.encode();
            debug!("stpm read {} 0x{:02X}: 0x{:08X}", def.name(), def.address(), word);
        }
        Ok(())
    }

    /// Read every control register and adopt the chip's state as the intended configuration.
    pub fn read_configuration(&mut self) -> Result<(), Error<T::Error>> {
        self.read_back()?;
        self.control = self.readback.clone();
        Ok(())
    }

    /// Write every control register in catalog order, then read them all back.
    ///
    /// The intended bank is kept as is; registers whose read-back differs are reported, not rolled
    /// back. A failure part way through leaves the chip partially written.
    pub fn apply_configuration(&mut self) -> Result<ConfigDrift, Error<T::Error>> {
        for def in CONTROL_REGISTERS {
            self.write_control(def)?;
        }
        self.read_back()?;

        let mut drift = ConfigDrift::default();
        for (intended, observed) in self.control.iter().zip(self.readback.iter()) {
            let def = intended.def();
            if VOLATILE.iter().any(|v| v.address() == def.address()) {
                continue;
            }
            if intended != observed {
                warn!(
                    "stpm {} wrote 0x{:08X}, read back 0x{:08X}",
                    def.name(),
                    intended.encode(),
                    observed.encode()
                );
                drift.mark(def);
            }
        }
        Ok(drift)
    }

    /// Fold `config` into the intended bank and apply it.
    pub fn configure(&mut self, config: &StpmConfiguration) -> Result<ConfigDrift, Error<T::Error>> {
        config.apply_to(&mut self.control)?;
        self.apply_configuration()
    }

    /// Request a coherent snapshot of the given channels and wait for the chip to confirm it.
    ///
    /// `cancel` is checked before every poll. Timeouts and cancellation are reported, never retried.
    pub fn latch_snapshot(
        &mut self,
        channels: Channels,
        budget: &LatchBudget,
        cancel: Option<&AtomicBool>,
    ) -> Result<(), Error<T::Error>> {
        let mut handshake = LatchHandshake::new(channels, *budget);
        if channels.is_empty() {
            return Ok(());
        }

        let cr3 = self.control.get_mut(&DSP_CR3);
        cr3.set("software_latch1", channels.channel1 as u32)?;
        cr3.set("software_latch2", channels.channel2 as u32)?;
        let request = cr3.encode();
        // the chip clears these itself; keep them out of later writes of the intended bank
        cr3.set("software_latch1", 0)?;
        cr3.set("software_latch2", 0)?;
        self.write_word(DSP_CR3.address(), request)?;

        let interval_us = u32::try_from(budget.poll_interval.as_micros()).unwrap_or(u32::MAX);
        let mut state = handshake.request_sent();
        while state == LatchState::Polling {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(Error::Cancelled);
            }
            let cr3 = self.read_control(&DSP_CR3)?;
            let latch1 = cr3.get("software_latch1")? != 0;
            let latch2 = cr3.get("software_latch2")? != 0;
            state = handshake.observe(latch1, latch2);
            if state == LatchState::Polling {
                self.delay.delay_us(interval_us);
                handshake.waited();
            }
        }

        match state {
            LatchState::Latched => Ok(()),
            _ => {
                debug!("stpm latch timed out after {} polls", handshake.polls());
                Err(Error::LatchTimeout {
                    pending: handshake.pending(),
                })
            }
        }
    }

    /// Read both RMS registers as they are (no latch).
    pub fn read_rms_snapshot(&mut self) -> Result<RmsSnapshot, Error<T::Error>> {
        let ch1 = self.read_data(&DSP_REG14)?;
        let (v1, c1) = (ch1.get("vrms")?, ch1.get("crms")?);
        let ch2 = self.read_data(&DSP_REG15)?;
        let (v2, c2) = (ch2.get("vrms")?, ch2.get("crms")?);
        Ok(RmsSnapshot {
            channel1_voltage_code: v1 as u16,
            channel1_current_code: c1,
            channel2_voltage_code: v2 as u16,
            channel2_current_code: c2,
        })
    }

    /// Latch both channels and return their voltage and current. A latch timeout is an error.
    pub fn read_both_channels(&mut self) -> Result<Measurement, Error<T::Error>> {
        self.read_both_channels_with(LatchPolicy::Require)
    }

    /// [`Stpm34::read_both_channels`] with a choice of what a latch timeout means.
    pub fn read_both_channels_with(&mut self, policy: LatchPolicy) -> Result<Measurement, Error<T::Error>> {
        let budget = self.latch_budget;
        let stale = match self.latch_snapshot(Channels::BOTH, &budget, None) {
            Ok(()) => false,
            Err(Error::LatchTimeout { pending }) if policy == LatchPolicy::AllowStale => {
                warn!("stpm latch timed out ({:?} pending), reading stale data", pending);
                true
            }
            Err(e) => return Err(e),
        };
        let snapshot = self.read_rms_snapshot()?;
        let mut measurement = self.convert(&snapshot)?;
        measurement.stale = stale;
        Ok(measurement)
    }

    /// DSP_SR1 and DSP_SR2 event flags.
    pub fn read_status(&mut self) -> Result<(DspStatus, DspStatus), Error<T::Error>> {
        let sr1 = self.read_control(&DSP_SR1)?.encode();
        let sr2 = self.read_control(&DSP_SR2)?.encode();
        Ok((DspStatus::from_bits_retain(sr1), DspStatus::from_bits_retain(sr2)))
    }

    /// Raw line period codes of channel 1 and channel 2 (DSP_REG1).
    pub fn read_periods(&mut self) -> Result<(u16, u16), Error<T::Error>> {
        let reg = self.read_data(&DSP_REG1)?;
        Ok((reg.get("ch1_period")? as u16, reg.get("ch2_period")? as u16))
    }

    /// Write all four calibration codes (DSP_CR5..DSP_CR8) as one operation.
    pub fn apply_calibration(&mut self, coefficients: CalibrationCoefficients) -> Result<(), Error<T::Error>> {
        if !coefficients.is_in_range() {
            warn!("stpm calibration {:?} exceeds 12 bits and will be truncated", coefficients);
        }
        let codes = [
            (&DSP_CR5, coefficients.channel1_voltage),
            (&DSP_CR6, coefficients.channel1_current),
            (&DSP_CR7, coefficients.channel2_voltage),
            (&DSP_CR8, coefficients.channel2_current),
        ];
        for (def, code) in codes {
            self.control.get_mut(def).set("calibration", code_to_field(code))?;
        }
        for (def, _) in codes {
            self.write_control(def)?;
        }
        Ok(())
    }

    /// Average `samples` latched RMS snapshots taken at the nominal voltage and current, derive
    /// calibration codes for both channels and apply them. Returns the codes for persistence.
    pub fn calibrate(
        &mut self,
        nominal_voltage: f64,
        nominal_current: f64,
        samples: u32,
    ) -> Result<CalibrationCoefficients, Error<T::Error>> {
        if samples == 0 {
            return Err(Error::NoSignal);
        }
        let prior = self.calibration()?;
        let budget = self.latch_budget;

        let mut sums = [0u64; 4];
        for _ in 0..samples {
            self.latch_snapshot(Channels::BOTH, &budget, None)?;
            let s = self.read_rms_snapshot()?;
            sums[0] += s.channel1_voltage_code as u64;
            sums[1] += s.channel1_current_code as u64;
            sums[2] += s.channel2_voltage_code as u64;
            sums[3] += s.channel2_current_code as u64;
        }
        if sums.contains(&0) {
            return Err(Error::NoSignal);
        }
        let avg = sums.map(|s| s as f64 / samples as f64);

        let (channel1_voltage, channel1_current) = self.front_end.derive_calibration(
            nominal_voltage,
            nominal_current,
            avg[0],
            avg[1],
            prior.channel1_voltage,
            prior.channel1_current,
        );
        let (channel2_voltage, channel2_current) = self.front_end.derive_calibration(
            nominal_voltage,
            nominal_current,
            avg[2],
            avg[3],
            prior.channel2_voltage,
            prior.channel2_current,
        );
        let coefficients = CalibrationCoefficients {
            channel1_voltage,
            channel1_current,
            channel2_voltage,
            channel2_current,
        };
        debug!("stpm calibration derived {:?}", coefficients);
        self.apply_calibration(coefficients)?;
        Ok(coefficients)
    }
}
