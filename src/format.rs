//! Text renderings of a [`ReadResult`].

use core::fmt::{self, Write};

use heapless::String;

use crate::dht11::ReadResult;
use crate::error::DhtError;

/// Room for the longest rendering: `HumanReadable` with three-digit values
/// takes 44 bytes.
pub const PAYLOAD_CAPACITY: usize = 64;

/// Formatted payload handed out by a session.
pub type Payload = String<PAYLOAD_CAPACITY>;

/// Output encodings, selected by number in the device configuration.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputFormat {
    /// `Values: 45, 0, 23, 0, 68, OK`
    #[default]
    Decimal = 0,
    /// `2D,00,17,00,44,OK`
    HexCompact = 1,
    /// `2D00170044OK`
    HexPacked = 2,
    /// `Temperature: 45C\nHumidity: 23%\nResult:OK\n`
    HumanReadable = 3,
}

impl TryFrom<u8> for OutputFormat {
    type Error = DhtError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Decimal),
            1 => Ok(Self::HexCompact),
            2 => Ok(Self::HexPacked),
            3 => Ok(Self::HumanReadable),
            other => Err(DhtError::InvalidFormat(other)),
        }
    }
}

/// A result paired with an encoding; renders through [`fmt::Display`].
pub struct Rendered<'r> {
    result: &'r ReadResult,
    format: OutputFormat,
}

pub fn render(result: &ReadResult, format: OutputFormat) -> Rendered<'_> {
    Rendered { result, format }
}

/// Renders into a fixed-capacity buffer. Never fails: an invalid result is
/// rendered with whatever bytes were captured and a `BAD` status.
pub fn format_payload(result: &ReadResult, format: OutputFormat) -> Payload {
    let mut payload = Payload::new();
    // Fits by construction, see PAYLOAD_CAPACITY
    let _ = write!(payload, "{}", render(result, format));
    payload
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [b0, b1, b2, b3, b4] = self.result.bytes();
        let status = if self.result.is_valid() { "OK" } else { "BAD" };

        match self.format {
            OutputFormat::Decimal => {
                write!(f, "Values: {b0}, {b1}, {b2}, {b3}, {b4}, {status}")
            }
            OutputFormat::HexCompact => {
                write!(f, "{b0:02X},{b1:02X},{b2:02X},{b3:02X},{b4:02X},{status}")
            }
            OutputFormat::HexPacked => {
                write!(f, "{b0:02X}{b1:02X}{b2:02X}{b3:02X}{b4:02X}{status}")
            }
            OutputFormat::HumanReadable => {
                write!(f, "Temperature: {b0}C\nHumidity: {b2}%\nResult:{status}\n")
            }
        }
    }
}
