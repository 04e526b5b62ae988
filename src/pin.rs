//! GPIO capability used by the driver.
//!
//! The driver never touches registers directly. Everything it needs from the
//! sensor line goes through [`PinController`]: direction, level, and the
//! edge-triggered notification that feeds the decoder.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::PinError;

/// GPIO numbers that may carry the sensor line.
pub const ALLOWED_PINS: [u8; 17] = [0, 1, 4, 7, 8, 9, 10, 11, 14, 15, 17, 18, 21, 22, 23, 24, 25];

/// A GPIO number checked against [`ALLOWED_PINS`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinId(u8);

impl PinId {
    /// Validates `number` against the allow-list.
    pub const fn new(number: u8) -> Result<Self, PinError> {
        let mut i = 0;
        while i < ALLOWED_PINS.len() {
            if ALLOWED_PINS[i] == number {
                return Ok(PinId(number));
            }
            i += 1;
        }
        Err(PinError::InvalidPin(number))
    }

    /// The raw GPIO number.
    pub const fn number(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for PinId {
    type Error = PinError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Logic level of the line.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// Which transitions raise an edge notification.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// Last known configuration of the controlled line.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinConfig {
    pub pin: PinId,
    pub direction: Direction,
    pub level: Level,
}

impl PinConfig {
    /// A released line: input, pulled high.
    pub const fn released(pin: PinId) -> Self {
        PinConfig {
            pin,
            direction: Direction::Input,
            level: Level::High,
        }
    }
}

/// Capability over the single GPIO line the sensor is wired to.
///
/// Errors propagate immediately; implementations must not retry.
pub trait PinController {
    /// The line this controller drives.
    fn pin(&self) -> PinId;

    fn set_direction(&mut self, direction: Direction) -> Result<(), PinError>;

    fn write_level(&mut self, level: Level) -> Result<(), PinError>;

    fn read_level(&mut self) -> Result<Level, PinError>;

    /// Starts raising edge notifications for `edge` transitions.
    fn enable_edge_notify(&mut self, edge: Edge) -> Result<(), PinError>;

    /// Stops edge notifications. Once this returns no further notification
    /// is delivered.
    fn disable_edge_notify(&mut self) -> Result<(), PinError>;

    /// Clears the pending notification. Called from the edge callback.
    fn acknowledge_edge(&mut self) -> Result<(), PinError>;
}

/// Platform hook for the edge interrupt of a GPIO line.
///
/// `embedded-hal` has no notion of pin interrupts, so [`HalPinController`]
/// takes this alongside the pin.
pub trait EdgeIrq {
    fn enable(&mut self, edge: Edge) -> Result<(), PinError>;

    fn disable(&mut self) -> Result<(), PinError>;

    fn acknowledge(&mut self) -> Result<(), PinError>;
}

/// [`PinController`] over an open-drain `embedded-hal` pin.
///
/// Switching to [`Direction::Input`] releases the line (drives it high through
/// the open drain) so the sensor can pull it low.
pub struct HalPinController<P, I> {
    pin: P,
    irq: I,
    config: PinConfig,
}

impl<P, I> HalPinController<P, I>
where
    P: InputPin + OutputPin,
    I: EdgeIrq,
{
    pub fn new(id: PinId, pin: P, irq: I) -> Self {
        HalPinController {
            pin,
            irq,
            config: PinConfig::released(id),
        }
    }

    pub fn config(&self) -> PinConfig {
        self.config
    }

    /// Gives back the pin and the interrupt hook.
    pub fn release(self) -> (P, I) {
        (self.pin, self.irq)
    }

    fn check<T, E>(&self, result: Result<T, E>) -> Result<T, PinError> {
        result.map_err(|_| {
            log_warn!("GPIO {} access failed", self.config.pin.number());
            PinError::HardwareUnavailable
        })
    }
}

impl<P, I> PinController for HalPinController<P, I>
where
    P: InputPin + OutputPin,
    I: EdgeIrq,
{
    fn pin(&self) -> PinId {
        self.config.pin
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), PinError> {
        if direction == Direction::Input {
            let released = self.pin.set_high();
            self.check(released)?;
            self.config.level = Level::High;
        }
        self.config.direction = direction;
        Ok(())
    }

    fn write_level(&mut self, level: Level) -> Result<(), PinError> {
        let written = match level {
            Level::Low => self.pin.set_low(),
            Level::High => self.pin.set_high(),
        };
        self.check(written)?;
        self.config.level = level;
        Ok(())
    }

    fn read_level(&mut self) -> Result<Level, PinError> {
        let high = self.pin.is_high();
        let level = Level::from(self.check(high)?);
        self.config.level = level;
        Ok(level)
    }

    fn enable_edge_notify(&mut self, edge: Edge) -> Result<(), PinError> {
        self.irq.enable(edge)
    }

    fn disable_edge_notify(&mut self) -> Result<(), PinError> {
        self.irq.disable()
    }

    fn acknowledge_edge(&mut self) -> Result<(), PinError> {
        self.irq.acknowledge()
    }
}
