//! Byte transport between the driver and one STPM34.
//!
//! Each exchange is two chip-select frames: the request is clocked out in the first, and the reply
//! is clocked in during the second while the host sends `0xFF` filler (a no-op frame for the chip).
//! Several chips may share one SPI bus; [`SpiTransport`] holds the bus lock for the whole
//! exchange so frames of different chips never interleave.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// Byte clocked out while reading a reply.
pub const FILL_BYTE: u8 = 0xFF;

/// Largest frame on the wire: 4 payload bytes plus CRC.
pub const MAX_FRAME: usize = 5;

/// SPI bus shared between several STPM34 instances.
pub type SharedBus<BUS> = Mutex<RefCell<BUS>>;

pub trait Transport {
    type Error: core::fmt::Debug;

    /// Send `request` in one chip-select frame, then read up to `reply.len()` bytes in a second frame.
    /// Returns the number of reply bytes received.
    fn exchange(&mut self, request: &[u8], reply: &mut [u8]) -> Result<usize, Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn exchange(&mut self, request: &[u8], reply: &mut [u8]) -> Result<usize, Self::Error> {
        T::exchange(self, request, reply)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug)]
pub enum SpiTransportError<BusError, PinError> {
    Spi(BusError),
    ChipSelect(PinError),
}

/// [`Transport`] over a shared [`SpiBus`] with a dedicated chip-select line per chip.
pub struct SpiTransport<'a, BUS, CS> {
    bus: &'a SharedBus<BUS>,
    cs: CS,
}

impl<'a, BUS, CS> SpiTransport<'a, BUS, CS>
where
    BUS: SpiBus,
    CS: OutputPin,
{
    /// Drives chip select inactive (high) before returning.
    pub fn new(bus: &'a SharedBus<BUS>, mut cs: CS) -> Result<Self, SpiTransportError<BUS::Error, CS::Error>> {
        cs.set_high().map_err(SpiTransportError::ChipSelect)?;
        Ok(Self { bus, cs })
    }

    /// Give back the chip-select pin.
    pub fn release(self) -> CS {
        self.cs
    }
}

fn frame<BUS, CS>(
    bus: &mut BUS,
    cs: &mut CS,
    op: impl FnOnce(&mut BUS) -> Result<(), BUS::Error>,
) -> Result<(), SpiTransportError<BUS::Error, CS::Error>>
where
    BUS: SpiBus,
    CS: OutputPin,
{
    cs.set_low().map_err(SpiTransportError::ChipSelect)?;
    let res = op(&mut *bus).and_then(|_| bus.flush());
    // release the chip even if the bus failed
    let released = cs.set_high();
    res.map_err(SpiTransportError::Spi)?;
    released.map_err(SpiTransportError::ChipSelect)
}

impl<BUS, CS> Transport for SpiTransport<'_, BUS, CS>
where
    BUS: SpiBus,
    CS: OutputPin,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    type Error = SpiTransportError<BUS::Error, CS::Error>;

    fn exchange(&mut self, request: &[u8], reply: &mut [u8]) -> Result<usize, Self::Error> {
        let fill = [FILL_BYTE; MAX_FRAME];
        let len = reply.len().min(MAX_FRAME);
        let cs = &mut self.cs;
        critical_section::with(|token| {
            let mut bus = self.bus.borrow_ref_mut(token);
            frame(&mut *bus, cs, |b| b.write(request))?;
            frame(&mut *bus, cs, |b| b.transfer(&mut reply[..len], &fill[..len]))?;
            Ok(len)
        })
    }
}
