#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]
#![allow(clippy::identity_op)]

//! # CANHacker adapter core for the MCP2515 CAN controller
//!
//! Firmware core of a USB-to-CAN adapter: the CANHacker/LAWICEL ASCII serial
//! protocol on one side, an MCP2515 on the SPI bus on the other.
//!
//! Crate currently offers the following features:
//! * Complete CANHacker command set including filters, masks and timestamps
//! * Standard and extended ID formats, data and remote frames
//! * Register level MCP2515 driver usable on its own
//! * no_std support
//!
//!## Example
//!
//!```
//!use mcp2515_canhacker::can::Mcp2515;
//!use mcp2515_canhacker::example::{ExampleClock, ExampleCsPin, ExampleSerial, ExampleSpiBus};
//!use mcp2515_canhacker::protocol::CanHacker;
//!
//!let clock = ExampleClock::default();
//!
//!let controller = Mcp2515::new(ExampleSpiBus::default(), ExampleCsPin);
//!let mut adapter = CanHacker::new(controller, ExampleSerial::default());
//!
//!// 125 kbps, open the channel, transmit a single byte to ID 0x100
//!adapter.process_command(b"S4", &clock).unwrap();
//!adapter.process_command(b"O", &clock).unwrap();
//!adapter.process_command(b"t1001FF", &clock).unwrap();
//!
//!assert!(adapter.is_connected());
//!```

pub mod can;
pub mod config;
pub mod status;

pub mod filter;
pub mod frame;

pub mod codec;
pub mod link;
pub mod protocol;

pub mod example;
#[cfg(test)]
pub(crate) mod mocks;
pub mod registers;
#[cfg(test)]
mod tests;
