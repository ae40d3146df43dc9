#![allow(dead_code)]

use core::convert::Infallible;

use stpm34_rs::registers::{CONTROL_REGISTERS, DSP_CR3, DSP_REG14, DSP_REG15, US_REG1};
use stpm34_rs::{Transport, crc8};

/// Highest register address is 0x8A.
const WORDS: usize = 0x8C / 2;
const LATCH_BITS: u32 = (1 << 21) | (1 << 22);
const LAST_CONTROL: u8 = 0x29;

pub fn rms_word(vrms: u32, crms: u32) -> u32 {
    (vrms & 0x7FFF) | (crms << 15)
}

/// In-memory STPM34 that answers frames the way the chip does.
///
/// Writes land on 16-bit halves: an even address takes the low half, the odd address after it the
/// high half. Latch bits set in DSP_CR3 stay set for `latch_clear_after` reads of DSP_CR3 (never
/// when `None`); when they clear, `live_rms` is copied into DSP_REG14/DSP_REG15.
pub struct FakeStpm {
    pub regs: [u32; WORDS],
    pub live_rms: [u32; 2],
    pub latch_clear_after: Option<u32>,
    pub cr3_reads: u32,
    /// Control addresses that ignore writes.
    pub stuck: Vec<u8>,
    /// Every request as received.
    pub log: Vec<Vec<u8>>,
    /// Answer the next exchange with only this many bytes.
    pub short_reply: Option<usize>,
    /// Flip the CRC byte of the next reply.
    pub corrupt_crc: bool,
}

impl FakeStpm {
    pub fn new() -> Self {
        let mut regs = [0; WORDS];
        for def in CONTROL_REGISTERS {
            regs[def.address() as usize / 2] = def.default_value();
        }
        Self {
            regs,
            live_rms: [0; 2],
            latch_clear_after: Some(1),
            cr3_reads: 0,
            stuck: Vec::new(),
            log: Vec::new(),
            short_reply: None,
            corrupt_crc: false,
        }
    }

    pub fn reg(&self, address: u8) -> u32 {
        self.regs[address as usize / 2]
    }

    pub fn set_reg(&mut self, address: u8, value: u32) {
        self.regs[address as usize / 2] = value;
    }

    pub fn crc_enabled(&self) -> bool {
        self.reg(US_REG1.address()) & (1 << 14) != 0
    }

    /// Requests whose read address is `address` and that carry no write.
    pub fn reads_of(&self, address: u8) -> usize {
        self.log.iter().filter(|r| r[0] == address && r[1] == 0xFF).count()
    }

    fn write_half(&mut self, address: u8, half: u16) {
        if address > LAST_CONTROL {
            return;
        }
        let base = address & !1;
        if self.stuck.contains(&base) {
            return;
        }
        let word = self.reg(base);
        let word = if address & 1 == 0 {
            (word & 0xFFFF_0000) | half as u32
        } else {
            (word & 0x0000_FFFF) | ((half as u32) << 16)
        };
        if base == DSP_CR3.address() && word & LATCH_BITS != 0 {
            self.cr3_reads = 0;
        }
        self.set_reg(base, word);
    }

    fn read(&mut self, address: u8) -> u32 {
        let cr3 = DSP_CR3.address();
        if address == cr3 && self.reg(cr3) & LATCH_BITS != 0 {
            self.cr3_reads += 1;
            if self.latch_clear_after.is_some_and(|n| self.cr3_reads >= n) {
                let word = self.reg(cr3) & !LATCH_BITS;
                self.set_reg(cr3, word);
                self.set_reg(DSP_REG14.address(), self.live_rms[0]);
                self.set_reg(DSP_REG15.address(), self.live_rms[1]);
            }
        }
        self.reg(address & !1)
    }
}

impl Transport for FakeStpm {
    type Error = Infallible;

    fn exchange(&mut self, request: &[u8], reply: &mut [u8]) -> Result<usize, Self::Error> {
        self.log.push(request.to_vec());
        if request.len() == 5 {
            assert_eq!(crc8(&request[..4]), request[4], "request crc");
        }

        let (read_address, write_address) = (request[0], request[1]);
        if write_address != 0xFF {
            self.write_half(write_address, u16::from_le_bytes([request[2], request[3]]));
        }
        // only pure reads advance the latch countdown
        let value = match (read_address, write_address) {
            (0xFF, _) => 0,
            (address, 0xFF) => self.read(address),
            (address, _) => self.reg(address & !1),
        };

        let bytes = value.to_le_bytes();
        reply[..4].copy_from_slice(&bytes);
        if reply.len() == 5 {
            reply[4] = crc8(&bytes);
            if core::mem::take(&mut self.corrupt_crc) {
                reply[4] ^= 0x5A;
            }
        }
        Ok(self.short_reply.take().unwrap_or(reply.len()))
    }
}
