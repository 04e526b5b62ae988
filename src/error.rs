use core::fmt;

/// Errors reported by a [`PinController`](crate::pin::PinController).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinError {
    /// The GPIO number is not on the allow-list of usable pins.
    InvalidPin(u8),
    /// The line, its registers or its interrupt could not be claimed.
    HardwareUnavailable,
}

/// Possible errors from the DHT11 driver.
///
/// Sensor protocol failures (bad checksum, no response, exhausted retries)
/// are not errors: they are reported in-band through the payload status.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DhtError {
    /// The configured GPIO number is not on the allow-list.
    InvalidPin(u8),
    /// The output format selector is not one of `0..=3`.
    InvalidFormat(u8),
    /// The GPIO hardware could not be claimed or accessed.
    HardwareUnavailable,
    /// A session is already open.
    Busy,
}

impl From<PinError> for DhtError {
    fn from(value: PinError) -> Self {
        match value {
            PinError::InvalidPin(pin) => Self::InvalidPin(pin),
            PinError::HardwareUnavailable => Self::HardwareUnavailable,
        }
    }
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPin(pin) => write!(f, "GPIO {pin} is not a usable pin"),
            Self::HardwareUnavailable => f.write_str("GPIO hardware unavailable"),
        }
    }
}

impl fmt::Display for DhtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPin(pin) => write!(f, "GPIO {pin} is not a usable pin"),
            Self::InvalidFormat(format) => write!(f, "unknown output format {format}"),
            Self::HardwareUnavailable => f.write_str("GPIO hardware unavailable"),
            Self::Busy => f.write_str("device is busy"),
        }
    }
}

impl core::error::Error for PinError {}

impl core::error::Error for DhtError {}
