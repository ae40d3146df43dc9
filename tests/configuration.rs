mod common;

use common::FakeStpm;
use embedded_hal_mock::eh1::delay::NoopDelay;
use stpm34_rs::registers::{
    CONTROL_REGISTERS, DATA_REGISTERS, DSP_CR3, DSP_CR5, DSP_CR9, DSP_SR1, US_REG1,
};
use stpm34_rs::{CurrentGain, LineFrequency, Register, RegisterDef, Stpm34, StpmConfiguration};

#[test]
fn catalog_layouts_are_consistent() {
    for def in CONTROL_REGISTERS {
        assert_eq!(Register::new(def).encode(), def.default_value(), "{}", def.name());
        let fields = def.fields();
        for (i, a) in fields.iter().enumerate() {
            for b in &fields[i + 1..] {
                assert!(!a.bits.overlaps(&b.bits), "{}: {} / {}", def.name(), a.name, b.name);
            }
        }
    }
    for def in DATA_REGISTERS {
        assert_eq!(Register::new(def).encode(), def.default_value(), "{}", def.name());
        assert_eq!(def.address() % 2, 0);
    }
}

fn assert_round_trip<B: 'static>(def: &'static RegisterDef<B>) {
    let covered = def.covered_bits();
    let mut reg = Register::new(def);
    for word in [covered, 0xA5A5_A5A5 & covered, 0x5A5A_5A5A & covered, 0] {
        reg.decode(word);
        assert_eq!(reg.encode(), word, "{} 0x{:08X}", def.name(), word);
    }
    // bits outside every field are dropped
    reg.decode(u32::MAX);
    assert_eq!(reg.encode(), covered, "{}", def.name());

    for f in def.fields() {
        let mut reg = Register::new(def);
        let max = f.bits.mask();
        reg.set(f.name, max).unwrap();
        assert_eq!(reg.get(f.name).unwrap(), max, "{}.{}", def.name(), f.name);
        assert_eq!(reg.encode() & f.bits.span(), f.bits.span(), "{}.{}", def.name(), f.name);
        reg.decode(reg.encode());
        assert_eq!(reg.get(f.name).unwrap(), max, "{}.{}", def.name(), f.name);
    }
}

#[test]
fn every_register_round_trips() {
    for def in CONTROL_REGISTERS {
        assert_round_trip(def);
    }
    for def in DATA_REGISTERS {
        assert_round_trip(def);
    }
}

#[test]
fn unknown_field_is_an_error() {
    let mut reg = Register::new(&DSP_CR3);
    assert_eq!(reg.get("no_such_field").unwrap_err().register, "DSP_CR3");
    assert!(reg.set("vrms", 1).is_err());
    // out-of-range values are truncated to the field width
    reg.set("ref_freq", 3).unwrap();
    assert_eq!(reg.get("ref_freq").unwrap(), 1);
}

#[test]
fn applied_configuration_reads_back_clean() {
    let mut fake = FakeStpm::new();
    let mut cfg = StpmConfiguration::default();
    cfg.line_frequency = LineFrequency::F60Hz;
    cfg.channels[0].current_gain = CurrentGain::X8;
    cfg.channels[1].voltage_calibration = 0x7F0;
    {
        let mut drv = Stpm34::new(&mut fake, NoopDelay::new());
        let drift = drv.configure(&cfg).unwrap();
        assert!(drift.is_clean(), "{:?}", drift);
        assert_eq!(drv.readback_bank(), drv.control_bank());
        assert_eq!(drv.configuration().unwrap(), cfg);
    }
    // two frames per control register, then one read each
    assert_eq!(fake.log.len(), CONTROL_REGISTERS.len() * 3);
    assert_eq!(fake.reg(DSP_CR3.address()) >> 27 & 1, 1);
}

#[test]
fn drift_is_reported_without_rollback() {
    let mut fake = FakeStpm::new();
    fake.stuck.push(DSP_CR9.address());
    fake.set_reg(DSP_CR9.address(), 0x123);
    fake.stuck.push(DSP_SR1.address());
    fake.set_reg(DSP_SR1.address(), 1 << 5);

    let mut drv = Stpm34::new(&mut fake, NoopDelay::new());
    let drift = drv.apply_configuration().unwrap();
    assert_eq!(drift.len(), 1);
    assert!(drift.contains(&DSP_CR9));
    assert_eq!(drift.iter().map(|d| d.name()).collect::<Vec<_>>(), ["DSP_CR9"]);
    // live status flags are not drift
    assert!(!drift.contains(&DSP_SR1));

    assert_eq!(drv.control(&DSP_CR9).encode(), 0xFFF);
    assert_eq!(drv.readback(&DSP_CR9).encode(), 0x123);
}

#[test]
fn disabling_crc_switches_framing() {
    let mut fake = FakeStpm::new();
    let cfg = StpmConfiguration {
        crc: false,
        ..Default::default()
    };
    {
        let mut drv = Stpm34::new(&mut fake, NoopDelay::new());
        let drift = drv.configure(&cfg).unwrap();
        assert!(drift.is_clean());
        assert_eq!(drv.readback(&US_REG1).get("crc_en").unwrap(), 0);
    }
    assert!(!fake.crc_enabled());
    assert!(fake.log.iter().all(|r| r.len() == 4));
}

#[test]
fn read_configuration_adopts_device_state() {
    let mut fake = FakeStpm::new();
    fake.set_reg(DSP_CR5.address(), 0x003F_F123);
    let mut drv = Stpm34::new(&mut fake, NoopDelay::new());
    drv.read_configuration().unwrap();
    assert_eq!(drv.calibration().unwrap().channel1_voltage, 0x123);
    assert_eq!(drv.control(&DSP_CR5), drv.readback(&DSP_CR5));
}
