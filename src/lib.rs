//! STPM34 Rust Driver
//!
//! Driver for the ST STPM34 dual-channel energy metering IC over SPI.
//!
//! Features:
//! - no-std, synchronous, built on `embedded-hal` 1.0 (`SpiBus`, `OutputPin`, `DelayNs`)
//! - several chips on one bus through a `critical-section` protected [`transport::SharedBus`]
//! - typed register catalog with named bit fields; data registers are read-only at the type level
//! - CRC-8 framing, software latch handshake with poll budget and cancellation
//! - calibration and raw-code to volts/amperes conversion
//! - optional `defmt` and `serde` support

#![no_std]

pub mod calibration;
pub mod configuration;
pub mod data_types;
pub mod driver;
pub mod error;
pub mod latch;
pub mod registers;
pub mod transport;

pub use calibration::{DEFAULT_CALIBRATION_SAMPLES, FrontEnd};
pub use configuration::{ChannelConfiguration, StpmConfiguration};
pub use data_types::{
    CalibrationCoefficients, ChannelReading, Channels, ConfigDrift, CurrentGain, LatchPolicy, LineFrequency,
    Measurement, RmsSnapshot,
};
pub use driver::{Stpm34, crc8};
pub use error::{Error, UnknownField};
pub use latch::LatchBudget;
pub use registers::{Control, Data, DspStatus, Register, RegisterDef};
pub use transport::{SharedBus, SpiTransport, SpiTransportError, Transport};
