//! Register model and the fixed STPM34 register map.
//!
//! Every register is a 32-bit word split into named [`BitField`]s. Layouts and reset values are
//! taken from the STPM32/33/34 datasheet. The map is split into two banks at the type level:
//! [`Control`] registers are read and written by the host, [`Data`] registers are populated by the
//! device and can only be read.

use core::marker::PhantomData;

use crate::error::UnknownField;

/// Largest number of fields any register declares (the status/IRQ registers are 32 one-bit flags).
pub const MAX_FIELDS: usize = 32;

/// Contiguous bit range `[start, start + width)` within a 32-bit word.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BitField {
    start: u8,
    width: u8,
}

impl BitField {
    /// Panics (at compile time for catalog constants) if `width == 0` or the range exceeds bit 31.
    pub const fn new(start: u8, width: u8) -> Self {
        assert!(width >= 1 && start as u32 + width as u32 <= 32);
        Self { start, width }
    }

    /// Single-bit field.
    pub const fn bit(start: u8) -> Self {
        Self::new(start, 1)
    }

    /// Lowest bit position.
    pub const fn start(&self) -> u8 {
        self.start
    }

    /// Number of bits.
    pub const fn width(&self) -> u8 {
        self.width
    }

    /// Right-aligned value mask, `(1 << width) - 1`.
    pub const fn mask(&self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Bits this field occupies inside the word.
    pub const fn span(&self) -> u32 {
        self.mask() << self.start
    }

    /// Extract the field value from `word`.
    pub const fn decode(&self, word: u32) -> u32 {
        (word >> self.start) & self.mask()
    }

    /// Replace this field's bits in `word` with `value`. Values wider than the field are truncated.
    pub const fn encode(&self, value: u32, word: u32) -> u32 {
        (word & !self.span()) | ((value & self.mask()) << self.start)
    }

    /// Whether the two fields share any bit.
    pub const fn overlaps(&self, other: &BitField) -> bool {
        self.span() & other.span() != 0
    }
}

/// A named bit field of a register layout.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub bits: BitField,
}

const fn field(name: &'static str, start: u8, width: u8) -> Field {
    Field {
        name,
        bits: BitField::new(start, width),
    }
}

const fn flag(name: &'static str, bit: u8) -> Field {
    Field {
        name,
        bits: BitField::bit(bit),
    }
}

/// Marker for host-writable configuration registers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Control {}

/// Marker for device-populated, read-only registers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Data {}

/// Static description of one register: address, reset value and field layout.
///
/// Only the catalog in this module creates definitions, so every `RegisterDef<Control>` is a member
/// of [`CONTROL_REGISTERS`] and every `RegisterDef<Data>` of [`DATA_REGISTERS`].
#[derive(Debug, Eq, PartialEq)]
pub struct RegisterDef<B> {
    name: &'static str,
    address: u8,
    index: u8,
    default: u32,
    fields: &'static [Field],
    _bank: PhantomData<B>,
}

impl<B> RegisterDef<B> {
    const fn new(name: &'static str, address: u8, index: u8, default: u32, fields: &'static [Field]) -> Self {
        Self {
            name,
            address,
            index,
            default,
            fields,
            _bank: PhantomData,
        }
    }

    /// Datasheet name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Byte address used on the wire (the 32-bit register occupies `address` and `address + 1`).
    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Position within the bank catalog.
    pub const fn index(&self) -> usize {
        self.index as usize
    }

    /// Datasheet reset value.
    pub const fn default_value(&self) -> u32 {
        self.default
    }

    /// Field layout, in declaration order.
    pub const fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Look up a field by name, returning its position in the layout.
    pub fn field(&self, name: &str) -> Result<(usize, &'static Field), UnknownField> {
        let fields: &'static [Field] = self.fields;
        fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .ok_or(UnknownField { register: self.name })
    }

    /// Union of all field spans.
    pub const fn covered_bits(&self) -> u32 {
        let mut acc = 0;
        let mut i = 0;
        while i < self.fields.len() {
            acc |= self.fields[i].bits.span();
            i += 1;
        }
        acc
    }

    const fn is_well_formed(&self) -> bool {
        if self.fields.len() > MAX_FIELDS || self.default & !self.covered_bits() != 0 {
            return false;
        }
        let mut i = 0;
        while i < self.fields.len() {
            let mut j = i + 1;
            while j < self.fields.len() {
                if self.fields[i].bits.overlaps(&self.fields[j].bits) {
                    return false;
                }
                j += 1;
            }
            i += 1;
        }
        true
    }
}

/// Live copy of one register: the current value of each field of its definition.
#[derive(Clone, Debug)]
pub struct Register<B: 'static> {
    def: &'static RegisterDef<B>,
    values: [u32; MAX_FIELDS],
}

impl<B: 'static> Register<B> {
    /// New register holding the definition's reset value.
    pub fn new(def: &'static RegisterDef<B>) -> Self {
        let mut reg = Self {
            def,
            values: [0; MAX_FIELDS],
        };
        reg.decode(def.default);
        reg
    }

    /// Static definition this register was built from.
    pub fn def(&self) -> &'static RegisterDef<B> {
        self.def
    }

    /// Datasheet name, e.g. `"DSP_CR3"`.
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Wire address of the register.
    pub fn address(&self) -> u8 {
        self.def.address
    }

    /// Replace every field value with the corresponding bits of `word`.
    pub fn decode(&mut self, word: u32) {
        for (slot, f) in self.values.iter_mut().zip(self.def.fields) {
            *slot = f.bits.decode(word);
        }
    }

    /// Fold all field values into a 32-bit word. Bits outside every field encode as zero.
    pub fn encode(&self) -> u32 {
        self.def
            .fields
            .iter()
            .zip(self.values.iter())
            .fold(0, |acc, (f, &v)| {
                debug_assert!(acc & f.bits.span() == 0, "overlapping field {}", f.name);
                f.bits.encode(v, acc)
            })
    }

    /// Little-endian wire representation of [`Register::encode`].
    pub fn to_wire_bytes(&self) -> [u8; 4] {
        self.encode().to_le_bytes()
    }

    /// Current value of the named field.
    pub fn get(&self, name: &str) -> Result<u32, UnknownField> {
        let (idx, _) = self.def.field(name)?;
        Ok(self.values[idx])
    }

    /// Set a field. Values wider than the field are truncated to its width.
    pub fn set(&mut self, name: &str, value: u32) -> Result<(), UnknownField> {
        let (idx, f) = self.def.field(name)?;
        self.values[idx] = value & f.bits.mask();
        Ok(())
    }

    /// Restore the datasheet reset value.
    pub fn reset(&mut self) {
        self.decode(self.def.default);
    }

    /// `(name, value)` for every field in layout order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        self.def.fields.iter().zip(self.values.iter()).map(|(f, &v)| (f.name, v))
    }
}

impl<B: 'static> PartialEq for Register<B> {
    fn eq(&self, other: &Self) -> bool {
        self.def.address == other.def.address && self.encode() == other.encode()
    }
}

impl<B: 'static> Eq for Register<B> {}

pub const CONTROL_COUNT: usize = 21;
pub const DATA_COUNT: usize = 45;

/// In-memory copy of every control register, in catalog order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlBank {
    regs: [Register<Control>; CONTROL_COUNT],
}

impl ControlBank {
    /// Bank holding every control register at its reset value.
    pub fn new() -> Self {
        Self {
            regs: CONTROL_REGISTERS.map(Register::new),
        }
    }

    /// Register for `def`.
    pub fn get(&self, def: &RegisterDef<Control>) -> &Register<Control> {
        &self.regs[def.index()]
    }

    /// Mutable register for `def`.
    pub fn get_mut(&mut self, def: &RegisterDef<Control>) -> &mut Register<Control> {
        &mut self.regs[def.index()]
    }

    /// Registers in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Register<Control>> {
        self.regs.iter()
    }

    /// Mutable registers in catalog order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Register<Control>> {
        self.regs.iter_mut()
    }
}

impl Default for ControlBank {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory copy of every data register, in catalog order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataBank {
    regs: [Register<Data>; DATA_COUNT],
}

impl DataBank {
    /// Bank holding every data register at zero.
    pub fn new() -> Self {
        Self {
            regs: DATA_REGISTERS.map(Register::new),
        }
    }

    /// Last value read for `def`.
    pub fn get(&self, def: &RegisterDef<Data>) -> &Register<Data> {
        &self.regs[def.index()]
    }

    /// Mutable register for `def`, updated by reads.
    pub fn get_mut(&mut self, def: &RegisterDef<Data>) -> &mut Register<Data> {
        &mut self.regs[def.index()]
    }

    /// Registers in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Register<Data>> {
        self.regs.iter()
    }
}

impl Default for DataBank {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------------------------
// Layouts

const DSP_CR1_2_FIELDS: &[Field] = &[
    field("clear_ss_timeout", 0, 4),
    flag("clear_ss", 4),
    flag("en_vref", 5),
    field("temp_comp", 6, 3),
    flag("apparent_energy_mode", 17),
    flag("apparent_power_mode", 18),
    flag("bypass_hpf_voltage", 19),
    flag("bypass_hpf_current", 20),
    flag("rogowski", 21),
    field("led_speed", 24, 4),
    field("led_power_sel", 28, 2),
    field("led_channel_sel", 30, 2),
];

const DSP_CR3_FIELDS: &[Field] = &[
    field("sag_time_thr", 0, 14),
    field("zcr_sel", 14, 2),
    flag("zcr_en", 16),
    field("tamper_tolerance", 17, 2),
    flag("tamper_en", 19),
    flag("software_reset", 20),
    flag("software_latch1", 21),
    flag("software_latch2", 22),
    flag("software_auto_latch", 23),
    flag("led1_off", 24),
    flag("led2_off", 25),
    flag("cumulative_energy_en", 26),
    flag("ref_freq", 27),
];

const DSP_CR4_FIELDS: &[Field] = &[
    field("secondary_current_phase", 0, 10),
    field("secondary_voltage_phase", 10, 2),
    field("primary_current_phase", 12, 10),
    field("primary_voltage_phase", 22, 2),
];

const DSP_CR5_8_FIELDS: &[Field] = &[
    field("calibration", 0, 12),
    field("swell_thr", 12, 10),
    field("sag_thr", 22, 10),
];

const DSP_CR9_11_FIELDS: &[Field] = &[
    field("ah_upper_thr", 0, 12),
    field("active_power_offset", 12, 10),
    field("fundamental_power_offset", 22, 10),
];

const DSP_CR10_12_FIELDS: &[Field] = &[
    field("ah_lower_thr", 0, 12),
    field("reactive_power_offset", 12, 10),
    field("apparent_power_offset", 22, 10),
];

const DFE_CR_FIELDS: &[Field] = &[
    flag("voltage_en", 0),
    field("voltage_cfg", 1, 15),
    flag("current_en", 16),
    field("current_cfg", 17, 9),
    field("gain", 26, 2),
];

/// Shared by DSP_IRQ1/2 (masks) and DSP_SR1/2 (flags); bit positions match [`DspStatus`].
const DSP_EVENT_FIELDS: &[Field] = &[
    flag("tot_sign_active", 0),
    flag("tot_sign_reactive", 1),
    flag("tot_overflow_active", 2),
    flag("tot_overflow_reactive", 3),
    flag("ch2_sign_active", 4),
    flag("ch2_sign_fundamental", 5),
    flag("ch2_sign_reactive", 6),
    flag("ch2_sign_apparent", 7),
    flag("ch2_overflow_active", 8),
    flag("ch2_overflow_fundamental", 9),
    flag("ch2_overflow_reactive", 10),
    flag("ch2_overflow_apparent", 11),
    flag("ch1_sign_active", 12),
    flag("ch1_sign_fundamental", 13),
    flag("ch1_sign_reactive", 14),
    flag("ch1_sign_apparent", 15),
    flag("ch1_overflow_active", 16),
    flag("ch1_overflow_fundamental", 17),
    flag("ch1_overflow_reactive", 18),
    flag("ch1_overflow_apparent", 19),
    flag("current_adc_stuck", 20),
    flag("ah_accumulated", 21),
    flag("current_swell_start", 22),
    flag("current_swell_end", 23),
    flag("voltage_adc_stuck", 24),
    flag("voltage_period_error", 25),
    flag("voltage_sag_start", 26),
    flag("voltage_sag_end", 27),
    flag("voltage_swell_start", 28),
    flag("voltage_swell_end", 29),
    flag("tamper", 30),
    flag("tamper_or_wrong_connection", 31),
];

const US_REG1_FIELDS: &[Field] = &[
    field("crc_poly", 0, 8),
    flag("noise_cancel_en", 8),
    flag("break_on_err", 9),
    flag("crc_en", 14),
    flag("lsb_first", 15),
    field("timeout", 16, 8),
];

const US_REG2_FIELDS: &[Field] = &[field("baud", 0, 16), field("frame_delay", 16, 8)];

const US_REG3_FIELDS: &[Field] = &[
    flag("irq_uart_crc_error", 1),
    flag("irq_timeout_error", 2),
    flag("irq_frame_error", 3),
    flag("irq_noise_error", 4),
    flag("irq_rx_overrun", 5),
    flag("irq_tx_overrun", 6),
    flag("irq_rx_full", 8),
    flag("irq_tx_empty", 9),
    flag("irq_read_error", 10),
    flag("irq_write_error", 11),
    flag("irq_spi_crc_error", 12),
    flag("irq_underrun", 13),
    flag("irq_overrun", 14),
    flag("break_received", 16),
    flag("uart_crc_error", 17),
    flag("timeout_error", 18),
    flag("frame_error", 19),
    flag("noise_error", 20),
    flag("rx_overrun", 21),
    flag("tx_overrun", 22),
    flag("rx_full", 24),
    flag("tx_empty", 25),
    flag("read_error", 26),
    flag("write_error", 27),
    flag("spi_crc_error", 28),
    flag("underrun", 29),
    flag("overrun", 30),
];

const DSP_EV_FIELDS: &[Field] = &[
    flag("tot_sign_active", 0),
    flag("tot_sign_reactive", 1),
    flag("tot_overflow_active", 2),
    flag("tot_overflow_reactive", 3),
    flag("sign_active", 4),
    flag("sign_fundamental", 5),
    flag("sign_reactive", 6),
    flag("sign_apparent", 7),
    flag("overflow_active", 8),
    flag("overflow_fundamental", 9),
    flag("overflow_reactive", 10),
    flag("overflow_apparent", 11),
    flag("current_zero_cross", 12),
    flag("current_adc_stuck", 13),
    flag("ah_accumulated", 14),
    field("current_swell_history", 15, 4),
    flag("voltage_zero_cross", 19),
    flag("voltage_adc_stuck", 20),
    flag("voltage_period_error", 21),
    field("voltage_swell_history", 22, 4),
    field("voltage_sag_history", 26, 4),
];

const PERIOD_FIELDS: &[Field] = &[field("ch1_period", 0, 12), field("ch2_period", 16, 12)];
const SAMPLE_FIELDS: &[Field] = &[field("data", 0, 24)];
const RMS_FIELDS: &[Field] = &[field("vrms", 0, 15), field("crms", 15, 17)];
const SAG_SWELL_FIELDS: &[Field] = &[field("swell_time", 0, 15), field("sag_time", 16, 15)];
const PHASE_FIELDS: &[Field] = &[field("swell_time", 0, 15), field("phase_angle", 16, 12)];
const POWER_FIELDS: &[Field] = &[field("data", 0, 29)];
const WORD_FIELDS: &[Field] = &[field("data", 0, 32)];

// ---------------------------------------------------------------------------------------------
// Control bank (addresses 0x00..=0x28)

pub const DSP_CR1: RegisterDef<Control> = RegisterDef::new("DSP_CR1", 0x00, 0, 0x0400_00A0, DSP_CR1_2_FIELDS);
pub const DSP_CR2: RegisterDef<Control> = RegisterDef::new("DSP_CR2", 0x02, 1, 0x2400_00A0, DSP_CR1_2_FIELDS);
/// Latch, reset, zero-crossing and line frequency control.
pub const DSP_CR3: RegisterDef<Control> = RegisterDef::new("DSP_CR3", 0x04, 2, 0x0000_04E0, DSP_CR3_FIELDS);
/// Phase compensation for both channels.
pub const DSP_CR4: RegisterDef<Control> = RegisterDef::new("DSP_CR4", 0x06, 3, 0x0000_0000, DSP_CR4_FIELDS);
/// Channel 1 voltage calibration and swell/sag thresholds.
pub const DSP_CR5: RegisterDef<Control> = RegisterDef::new("DSP_CR5", 0x08, 4, 0x003F_F800, DSP_CR5_8_FIELDS);
/// Channel 1 current calibration and swell threshold.
pub const DSP_CR6: RegisterDef<Control> = RegisterDef::new("DSP_CR6", 0x0A, 5, 0x003F_F800, DSP_CR5_8_FIELDS);
/// Channel 2 voltage calibration and swell/sag thresholds.
pub const DSP_CR7: RegisterDef<Control> = RegisterDef::new("DSP_CR7", 0x0C, 6, 0x003F_F800, DSP_CR5_8_FIELDS);
/// Channel 2 current calibration and swell threshold.
pub const DSP_CR8: RegisterDef<Control> = RegisterDef::new("DSP_CR8", 0x0E, 7, 0x003F_F800, DSP_CR5_8_FIELDS);
pub const DSP_CR9: RegisterDef<Control> = RegisterDef::new("DSP_CR9", 0x10, 8, 0x0000_0FFF, DSP_CR9_11_FIELDS);
pub const DSP_CR10: RegisterDef<Control> = RegisterDef::new("DSP_CR10", 0x12, 9, 0x0000_0FFF, DSP_CR10_12_FIELDS);
pub const DSP_CR11: RegisterDef<Control> = RegisterDef::new("DSP_CR11", 0x14, 10, 0x0000_0FFF, DSP_CR9_11_FIELDS);
pub const DSP_CR12: RegisterDef<Control> = RegisterDef::new("DSP_CR12", 0x16, 11, 0x0000_0FFF, DSP_CR10_12_FIELDS);
/// Channel 1 analog front end: enables and current gain.
pub const DFE_CR1: RegisterDef<Control> = RegisterDef::new("DFE_CR1", 0x18, 12, 0x0F27_0327, DFE_CR_FIELDS);
/// Channel 2 analog front end: enables and current gain.
pub const DFE_CR2: RegisterDef<Control> = RegisterDef::new("DFE_CR2", 0x1A, 13, 0x0327_0327, DFE_CR_FIELDS);
pub const DSP_IRQ1: RegisterDef<Control> = RegisterDef::new("DSP_IRQ1", 0x1C, 14, 0, DSP_EVENT_FIELDS);
pub const DSP_IRQ2: RegisterDef<Control> = RegisterDef::new("DSP_IRQ2", 0x1E, 15, 0, DSP_EVENT_FIELDS);
pub const DSP_SR1: RegisterDef<Control> = RegisterDef::new("DSP_SR1", 0x20, 16, 0, DSP_EVENT_FIELDS);
pub const DSP_SR2: RegisterDef<Control> = RegisterDef::new("DSP_SR2", 0x22, 17, 0, DSP_EVENT_FIELDS);
/// Serial framing: CRC polynomial and enable, bit order, timeout.
pub const US_REG1: RegisterDef<Control> = RegisterDef::new("US_REG1", 0x24, 18, 0x0000_4007, US_REG1_FIELDS);
pub const US_REG2: RegisterDef<Control> = RegisterDef::new("US_REG2", 0x26, 19, 0x0000_0683, US_REG2_FIELDS);
pub const US_REG3: RegisterDef<Control> = RegisterDef::new("US_REG3", 0x28, 20, 0, US_REG3_FIELDS);

/// Control registers in write order.
pub const CONTROL_REGISTERS: [&RegisterDef<Control>; CONTROL_COUNT] = [
    &DSP_CR1, &DSP_CR2, &DSP_CR3, &DSP_CR4, &DSP_CR5, &DSP_CR6, &DSP_CR7, &DSP_CR8, &DSP_CR9, &DSP_CR10,
    &DSP_CR11, &DSP_CR12, &DFE_CR1, &DFE_CR2, &DSP_IRQ1, &DSP_IRQ2, &DSP_SR1, &DSP_SR2, &US_REG1,
    &US_REG2, &US_REG3,
];

// ---------------------------------------------------------------------------------------------
// Data bank (addresses 0x2A..=0x8A, DSP_REG10..13 are reserved and skipped)

pub const DSP_EV1: RegisterDef<Data> = RegisterDef::new("DSP_EV1", 0x2A, 0, 0, DSP_EV_FIELDS);
pub const DSP_EV2: RegisterDef<Data> = RegisterDef::new("DSP_EV2", 0x2C, 1, 0, DSP_EV_FIELDS);
/// Line period of both channels.
pub const DSP_REG1: RegisterDef<Data> = RegisterDef::new("DSP_REG1", 0x2E, 2, 0, PERIOD_FIELDS);
pub const DSP_REG2: RegisterDef<Data> = RegisterDef::new("DSP_REG2", 0x30, 3, 0, SAMPLE_FIELDS);
pub const DSP_REG3: RegisterDef<Data> = RegisterDef::new("DSP_REG3", 0x32, 4, 0, SAMPLE_FIELDS);
pub const DSP_REG4: RegisterDef<Data> = RegisterDef::new("DSP_REG4", 0x34, 5, 0, SAMPLE_FIELDS);
pub const DSP_REG5: RegisterDef<Data> = RegisterDef::new("DSP_REG5", 0x36, 6, 0, SAMPLE_FIELDS);
pub const DSP_REG6: RegisterDef<Data> = RegisterDef::new("DSP_REG6", 0x38, 7, 0, SAMPLE_FIELDS);
pub const DSP_REG7: RegisterDef<Data> = RegisterDef::new("DSP_REG7", 0x3A, 8, 0, SAMPLE_FIELDS);
pub const DSP_REG8: RegisterDef<Data> = RegisterDef::new("DSP_REG8", 0x3C, 9, 0, SAMPLE_FIELDS);
pub const DSP_REG9: RegisterDef<Data> = RegisterDef::new("DSP_REG9", 0x3E, 10, 0, SAMPLE_FIELDS);
/// Channel 1 RMS voltage (bits 0..15) and current (bits 15..32).
pub const DSP_REG14: RegisterDef<Data> = RegisterDef::new("DSP_REG14", 0x48, 11, 0, RMS_FIELDS);
/// Channel 2 RMS voltage (bits 0..15) and current (bits 15..32).
pub const DSP_REG15: RegisterDef<Data> = RegisterDef::new("DSP_REG15", 0x4A, 12, 0, RMS_FIELDS);
pub const DSP_REG16: RegisterDef<Data> = RegisterDef::new("DSP_REG16", 0x4C, 13, 0, SAG_SWELL_FIELDS);
pub const DSP_REG17: RegisterDef<Data> = RegisterDef::new("DSP_REG17", 0x4E, 14, 0, PHASE_FIELDS);
pub const DSP_REG18: RegisterDef<Data> = RegisterDef::new("DSP_REG18", 0x50, 15, 0, SAG_SWELL_FIELDS);
pub const DSP_REG19: RegisterDef<Data> = RegisterDef::new("DSP_REG19", 0x52, 16, 0, PHASE_FIELDS);
pub const PH1_REG1: RegisterDef<Data> = RegisterDef::new("PH1_REG1", 0x54, 17, 0, WORD_FIELDS);
pub const PH1_REG2: RegisterDef<Data> = RegisterDef::new("PH1_REG2", 0x56, 18, 0, WORD_FIELDS);
pub const PH1_REG3: RegisterDef<Data> = RegisterDef::new("PH1_REG3", 0x58, 19, 0, WORD_FIELDS);
pub const PH1_REG4: RegisterDef<Data> = RegisterDef::new("PH1_REG4", 0x5A, 20, 0, WORD_FIELDS);
pub const PH1_REG5: RegisterDef<Data> = RegisterDef::new("PH1_REG5", 0x5C, 21, 0, POWER_FIELDS);
pub const PH1_REG6: RegisterDef<Data> = RegisterDef::new("PH1_REG6", 0x5E, 22, 0, POWER_FIELDS);
pub const PH1_REG7: RegisterDef<Data> = RegisterDef::new("PH1_REG7", 0x60, 23, 0, POWER_FIELDS);
pub const PH1_REG8: RegisterDef<Data> = RegisterDef::new("PH1_REG8", 0x62, 24, 0, POWER_FIELDS);
pub const PH1_REG9: RegisterDef<Data> = RegisterDef::new("PH1_REG9", 0x64, 25, 0, POWER_FIELDS);
pub const PH1_REG10: RegisterDef<Data> = RegisterDef::new("PH1_REG10", 0x66, 26, 0, POWER_FIELDS);
pub const PH1_REG11: RegisterDef<Data> = RegisterDef::new("PH1_REG11", 0x68, 27, 0, POWER_FIELDS);
pub const PH1_REG12: RegisterDef<Data> = RegisterDef::new("PH1_REG12", 0x6A, 28, 0, WORD_FIELDS);
pub const PH2_REG1: RegisterDef<Data> = RegisterDef::new("PH2_REG1", 0x6C, 29, 0, WORD_FIELDS);
pub const PH2_REG2: RegisterDef<Data> = RegisterDef::new("PH2_REG2", 0x6E, 30, 0, WORD_FIELDS);
pub const PH2_REG3: RegisterDef<Data> = RegisterDef::new("PH2_REG3", 0x70, 31, 0, WORD_FIELDS);
pub const PH2_REG4: RegisterDef<Data> = RegisterDef::new("PH2_REG4", 0x72, 32, 0, WORD_FIELDS);
pub const PH2_REG5: RegisterDef<Data> = RegisterDef::new("PH2_REG5", 0x74, 33, 0, POWER_FIELDS);
pub const PH2_REG6: RegisterDef<Data> = RegisterDef::new("PH2_REG6", 0x76, 34, 0, POWER_FIELDS);
pub const PH2_REG7: RegisterDef<Data> = RegisterDef::new("PH2_REG7", 0x78, 35, 0, POWER_FIELDS);
pub const PH2_REG8: RegisterDef<Data> = RegisterDef::new("PH2_REG8", 0x7A, 36, 0, POWER_FIELDS);
pub const PH2_REG9: RegisterDef<Data> = RegisterDef::new("PH2_REG9", 0x7C, 37, 0, POWER_FIELDS);
pub const PH2_REG10: RegisterDef<Data> = RegisterDef::new("PH2_REG10", 0x7E, 38, 0, POWER_FIELDS);
pub const PH2_REG11: RegisterDef<Data> = RegisterDef::new("PH2_REG11", 0x80, 39, 0, POWER_FIELDS);
pub const PH2_REG12: RegisterDef<Data> = RegisterDef::new("PH2_REG12", 0x82, 40, 0, WORD_FIELDS);
pub const TOT_REG1: RegisterDef<Data> = RegisterDef::new("TOT_REG1", 0x84, 41, 0, WORD_FIELDS);
pub const TOT_REG2: RegisterDef<Data> = RegisterDef::new("TOT_REG2", 0x86, 42, 0, WORD_FIELDS);
pub const TOT_REG3: RegisterDef<Data> = RegisterDef::new("TOT_REG3", 0x88, 43, 0, WORD_FIELDS);
pub const TOT_REG4: RegisterDef<Data> = RegisterDef::new("TOT_REG4", 0x8A, 44, 0, WORD_FIELDS);

pub const DATA_REGISTERS: [&RegisterDef<Data>; DATA_COUNT] = [
    &DSP_EV1, &DSP_EV2, &DSP_REG1, &DSP_REG2, &DSP_REG3, &DSP_REG4, &DSP_REG5, &DSP_REG6, &DSP_REG7,
    &DSP_REG8, &DSP_REG9, &DSP_REG14, &DSP_REG15, &DSP_REG16, &DSP_REG17, &DSP_REG18, &DSP_REG19,
    &PH1_REG1, &PH1_REG2, &PH1_REG3, &PH1_REG4, &PH1_REG5, &PH1_REG6, &PH1_REG7, &PH1_REG8, &PH1_REG9,
    &PH1_REG10, &PH1_REG11, &PH1_REG12, &PH2_REG1, &PH2_REG2, &PH2_REG3, &PH2_REG4, &PH2_REG5,
    &PH2_REG6, &PH2_REG7, &PH2_REG8, &PH2_REG9, &PH2_REG10, &PH2_REG11, &PH2_REG12, &TOT_REG1,
    &TOT_REG2, &TOT_REG3, &TOT_REG4,
];

const fn catalog_is_valid() -> bool {
    let mut i = 0;
    while i < CONTROL_COUNT {
        let def = CONTROL_REGISTERS[i];
        if def.index() != i || def.address as usize != 2 * i || !def.is_well_formed() {
            return false;
        }
        i += 1;
    }
    let mut i = 0;
    while i < DATA_COUNT {
        let def = DATA_REGISTERS[i];
        if def.index() != i || def.address < 0x2A || def.address % 2 != 0 || !def.is_well_formed() {
            return false;
        }
        i += 1;
    }
    true
}

const _: () = assert!(catalog_is_valid());

bitflags::bitflags! {
    /// DSP_SR1/DSP_SR2 event flags (same positions as the DSP_IRQ1/DSP_IRQ2 masks).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct DspStatus: u32 {
        const TOT_SIGN_ACTIVE          = 1 << 0;
        const TOT_SIGN_REACTIVE        = 1 << 1;
        const TOT_OVERFLOW_ACTIVE      = 1 << 2;
        const TOT_OVERFLOW_REACTIVE    = 1 << 3;
        const CH2_SIGN_ACTIVE          = 1 << 4;
        const CH2_SIGN_FUNDAMENTAL     = 1 << 5;
        const CH2_SIGN_REACTIVE        = 1 << 6;
        const CH2_SIGN_APPARENT        = 1 << 7;
        const CH2_OVERFLOW_ACTIVE      = 1 << 8;
        const CH2_OVERFLOW_FUNDAMENTAL = 1 << 9;
        const CH2_OVERFLOW_REACTIVE    = 1 << 10;
        const CH2_OVERFLOW_APPARENT    = 1 << 11;
        const CH1_SIGN_ACTIVE          = 1 << 12;
        const CH1_SIGN_FUNDAMENTAL     = 1 << 13;
        const CH1_SIGN_REACTIVE        = 1 << 14;
        const CH1_SIGN_APPARENT        = 1 << 15;
        const CH1_OVERFLOW_ACTIVE      = 1 << 16;
        const CH1_OVERFLOW_FUNDAMENTAL = 1 << 17;
        const CH1_OVERFLOW_REACTIVE    = 1 << 18;
        const CH1_OVERFLOW_APPARENT    = 1 << 19;
        const CURRENT_ADC_STUCK        = 1 << 20;
        const AH_ACCUMULATED           = 1 << 21;
        const CURRENT_SWELL_START      = 1 << 22;
        const CURRENT_SWELL_END        = 1 << 23;
        const VOLTAGE_ADC_STUCK        = 1 << 24;
        const VOLTAGE_PERIOD_ERROR     = 1 << 25;
        const VOLTAGE_SAG_START        = 1 << 26;
        const VOLTAGE_SAG_END          = 1 << 27;
        const VOLTAGE_SWELL_START      = 1 << 28;
        const VOLTAGE_SWELL_END        = 1 << 29;
        const TAMPER                   = 1 << 30;
        const TAMPER_OR_WRONG_CONNECTION = 1 << 31;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_width_field_masks_everything() {
        let f = BitField::new(0, 32);
        assert_eq!(f.mask(), u32::MAX);
        assert_eq!(f.decode(0xDEAD_BEEF), 0xDEAD_BEEF);
        assert_eq!(f.encode(0x1234_5678, 0xFFFF_FFFF), 0x1234_5678);
    }

    #[test]
    fn encode_truncates_and_preserves_neighbours() {
        let f = BitField::new(4, 4);
        assert_eq!(f.encode(0x1F, 0xFFFF_0000), 0xFFFF_00F0);
        assert_eq!(f.encode(0x3, 0x0000_FFFF), 0x0000_FF3F);
    }

    #[test]
    fn bank_lookup_follows_catalog_index() {
        let bank = ControlBank::new();
        assert_eq!(bank.get(&US_REG1).address(), 0x24);
        let data = DataBank::new();
        assert_eq!(data.get(&DSP_REG15).address(), 0x4A);
    }
}
