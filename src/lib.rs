//! Interrupt-driven DHT11 Sensor Driver for Embedded Rust
//!
//! This crate reads the DHT11 temperature and humidity sensor by timing the
//! edges of its single-wire line from a GPIO interrupt, instead of busy
//! polling the pin.
//!
//! # Architecture
//! - [`PinController`]: capability over the sensor's GPIO line, with an
//!   [`embedded-hal`] adapter ([`HalPinController`])
//! - [`EdgeCapture`]: the decoder stepped from the GPIO interrupt; it turns
//!   pulse widths into the 5-byte frame
//! - [`Dht11`]: blocking read sequence with wake handshake, settle deadline,
//!   checksum validation and retries with cool-off
//! - [`format`]: text renderings of a [`ReadResult`]
//! - [`Device`]: single-open session (`open` / `read` / `close`) streaming
//!   the formatted result
//!
//! # Wiring the interrupt
//!
//! The capture is shared with the interrupt handler, usually as a `static`.
//! The handler calls [`EdgeCapture::handle_edge`] with its own handle on the
//! line and the same clock the driver uses.
//!
//! # Optional Features
//! - `defmt`: Implements `defmt::Format` and routes logging through `defmt`
//! - `log`: Routes logging through the `log` facade
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal

#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod clock;
pub mod decoder;
pub mod dht11;
pub mod error;
pub mod format;
pub mod pin;
pub mod session;

#[cfg(test)]
mod mock;

pub use clock::Clock;
pub use decoder::{CaptureState, EdgeCapture, EdgeOutcome, Thresholds};
pub use dht11::{Dht11, ReadResult, ReadTimings, Reading};
pub use error::{DhtError, PinError};
pub use format::OutputFormat;
pub use pin::{Direction, Edge, EdgeIrq, HalPinController, Level, PinController, PinId};
pub use session::{Config, Device};
