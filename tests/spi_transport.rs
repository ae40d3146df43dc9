use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTrans};
use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTrans};
use stpm34_rs::registers::US_REG1;
use stpm34_rs::{SpiTransport, Stpm34, crc8};

fn frame_pins(frames: usize) -> Vec<PinTrans> {
    let mut pins = vec![PinTrans::set(State::High)];
    for _ in 0..frames {
        pins.push(PinTrans::set(State::Low));
        pins.push(PinTrans::set(State::High));
    }
    pins
}

#[test]
fn read_is_request_frame_then_reply_frame() {
    let request = [0x24, 0xFF, 0xFF, 0xFF, crc8(&[0x24, 0xFF, 0xFF, 0xFF])];
    let reply = [0x07, 0x40, 0x00, 0x00, crc8(&[0x07, 0x40, 0x00, 0x00])];
    let spi_expect = [
        SpiTrans::write_vec(request.to_vec()),
        SpiTrans::flush(),
        SpiTrans::transfer(vec![0xFF; 5], reply.to_vec()),
        SpiTrans::flush(),
    ];
    let spi = SpiMock::new(&spi_expect);
    let mut spi_handle = spi.clone();
    let cs = PinMock::new(&frame_pins(2));
    let mut cs_handle = cs.clone();

    let bus = Mutex::new(RefCell::new(spi));
    let transport = SpiTransport::new(&bus, cs).unwrap();
    let mut drv = Stpm34::new(transport, NoopDelay::new());
    let reg = drv.read_control(&US_REG1).unwrap();
    assert_eq!(reg.get("crc_en").unwrap(), 1);
    assert_eq!(reg.get("crc_poly").unwrap(), 0x07);

    let (transport, _) = drv.release();
    transport.release();
    spi_handle.done();
    cs_handle.done();
}

#[test]
fn two_chips_share_one_bus() {
    let read = |addr: u8| [addr, 0xFF, 0xFF, 0xFF, crc8(&[addr, 0xFF, 0xFF, 0xFF])];
    let zero = [0x00, 0x00, 0x00, 0x00, crc8(&[0x00; 4])];
    let spi_expect = [
        SpiTrans::write_vec(read(0x48).to_vec()),
        SpiTrans::flush(),
        SpiTrans::transfer(vec![0xFF; 5], zero.to_vec()),
        SpiTrans::flush(),
        SpiTrans::write_vec(read(0x4A).to_vec()),
        SpiTrans::flush(),
        SpiTrans::transfer(vec![0xFF; 5], zero.to_vec()),
        SpiTrans::flush(),
    ];
    let spi = SpiMock::new(&spi_expect);
    let mut spi_handle = spi.clone();
    let cs_a = PinMock::new(&frame_pins(2));
    let cs_b = PinMock::new(&frame_pins(2));
    let (mut a_handle, mut b_handle) = (cs_a.clone(), cs_b.clone());

    let bus = Mutex::new(RefCell::new(spi));
    let mut chip_a = Stpm34::new(SpiTransport::new(&bus, cs_a).unwrap(), NoopDelay::new());
    let mut chip_b = Stpm34::new(SpiTransport::new(&bus, cs_b).unwrap(), NoopDelay::new());
    assert_eq!(chip_a.read_word(0x48).unwrap(), 0);
    assert_eq!(chip_b.read_word(0x4A).unwrap(), 0);

    drop((chip_a, chip_b));
    spi_handle.done();
    a_handle.done();
    b_handle.done();
}
