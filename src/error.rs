//! Error definitions for the STPM34 driver.

use crate::data_types::Channels;

/// A field name was looked up on a register that does not declare it.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnknownField {
    /// Name of the register the lookup was made against.
    pub register: &'static str,
}

impl core::fmt::Display for UnknownField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown field on register {}", self.register)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug)]
pub enum Error<E> {
    /// Underlying transport (bus or chip-select) failed.
    Transport(E),
    /// Reply length did not match the current framing (4 bytes, or 5 with CRC).
    ShortReply { expected: usize, received: usize },
    /// CRC-8 of a reply did not match its trailing checksum byte. The decoded register was not updated.
    CrcMismatch { expected: u8, received: u8 },
    /// The device did not clear the requested software latch bits within the poll budget.
    LatchTimeout { pending: Channels },
    /// The latch handshake observed the cancellation flag.
    Cancelled,
    /// Field name not present in the register's layout.
    UnknownField(UnknownField),
    /// Calibration sampling produced a zero average; no code can be derived.
    NoSignal,
    /// Raw write to an address that is not the start of a control register.
    NotWritable { address: u8 },
}

impl<E> From<UnknownField> for Error<E> {
    fn from(e: UnknownField) -> Self {
        Error::UnknownField(e)
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {:?}", e),
            Error::ShortReply { expected, received } => {
                write!(f, "reply length {} (expected {})", received, expected)
            }
            Error::CrcMismatch { expected, received } => {
                write!(f, "crc mismatch: calculated 0x{:02X}, received 0x{:02X}", expected, received)
            }
            Error::LatchTimeout { pending } => write!(f, "latch timed out, pending {:?}", pending),
            Error::Cancelled => write!(f, "latch handshake cancelled"),
            Error::UnknownField(e) => write!(f, "{}", e),
            Error::NoSignal => write!(f, "averaged rms code is zero"),
            Error::NotWritable { address } => write!(f, "address 0x{:02X} is not a control register", address),
        }
    }
}
