//! Soft-UART over a pulse-timing peripheral: synthesizes a
//! 5-9 bit UART (SeaTalk needs 9, no hardware UART on the target offers
//! that) from `(level, duration)` pulses, grounded on
//! `components/RMTUART/RMTCharBuilder.cpp`.

pub mod bitstream;
pub mod charbuilder;
pub mod config;
pub mod pulse;

pub use charbuilder::CharBuilder;
pub use config::{DataWidth, Parity, SoftUartParams, StopBits};
pub use pulse::Pulse;
