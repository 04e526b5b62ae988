//! Single-open device session around the read sequencer.

use embedded_hal::delay::DelayNs;

use crate::clock::Clock;
use crate::decoder::{EdgeCapture, Thresholds};
use crate::dht11::{Dht11, ReadResult, ReadTimings};
use crate::error::DhtError;
use crate::format::{OutputFormat, Payload, format_payload};
use crate::pin::{PinController, PinId};

/// Device configuration, validated when it is built.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub pin: PinId,
    pub format: OutputFormat,
    pub timings: ReadTimings,
    pub thresholds: Thresholds,
}

impl Config {
    /// Builds a configuration from raw parameters.
    ///
    /// # Arguments
    ///
    /// * `pin` - GPIO number, must be in [`ALLOWED_PINS`](crate::pin::ALLOWED_PINS).
    /// * `format` - Output format selector, `0..=3`.
    pub fn new(pin: u8, format: u8) -> Result<Self, DhtError> {
        Ok(Config {
            pin: PinId::new(pin)?,
            format: OutputFormat::try_from(format)?,
            timings: ReadTimings::new(),
            thresholds: Thresholds::new(),
        })
    }

    pub fn with_timings(mut self, timings: ReadTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

struct Session {
    result: ReadResult,
    payload: Payload,
    cursor: usize,
}

/// The sensor as an openable device.
///
/// Opening takes a measurement and buffers it formatted; reads stream the
/// buffer; closing releases the device. Only one session can be open at a
/// time per [`EdgeCapture`], across every `Device` built on it.
pub struct Device<'a, P, C, D> {
    sensor: Dht11<'a, P, C, D>,
    capture: &'a EdgeCapture,
    format: OutputFormat,
    session: Option<Session>,
}

impl<'a, P, C, D> Device<'a, P, C, D>
where
    P: PinController,
    C: Clock,
    D: DelayNs,
{
    /// Activates the device: checks `pin` is the configured line and claims it.
    pub fn new(
        config: Config,
        pin: P,
        clock: C,
        delay: D,
        capture: &'a EdgeCapture,
    ) -> Result<Self, DhtError> {
        if pin.pin() != config.pin {
            log_error!(
                "controller drives GPIO {}, configured GPIO {}",
                pin.pin().number(),
                config.pin.number()
            );
            return Err(DhtError::InvalidPin(pin.pin().number()));
        }

        let mut sensor = Dht11::new(pin, clock, delay, capture)
            .with_timings(config.timings)
            .with_thresholds(config.thresholds);
        sensor.init()?;

        log_info!("DHT11 device ready on GPIO {}", config.pin.number());
        Ok(Device {
            sensor,
            capture,
            format: config.format,
            session: None,
        })
    }

    /// Opens a session: measures, formats and buffers the result.
    ///
    /// Blocks for the whole read, cool-off and retries included. Fails with
    /// [`DhtError::Busy`] without touching the line if a session is already
    /// open on the capture; a failed measurement is not an error, it shows
    /// up as a `BAD` status in the payload.
    pub fn open(&mut self) -> Result<(), DhtError> {
        if self.session.is_some() || !self.capture.claim() {
            log_debug!("DHT11 open rejected, session already open");
            return Err(DhtError::Busy);
        }

        let result = match self.sensor.read() {
            Ok(result) => result,
            Err(e) => {
                self.capture.release();
                return Err(e.into());
            }
        };
        let payload = format_payload(&result, self.format);
        log_debug!(
            "DHT11 session opened, {} bytes buffered, valid: {}",
            payload.len(),
            result.is_valid()
        );

        self.session = Some(Session {
            result,
            payload,
            cursor: 0,
        });
        Ok(())
    }

    /// Copies the next part of the payload into `buf`.
    ///
    /// Returns the number of bytes copied; 0 at the end of the payload or
    /// when no session is open.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };

        let rest = &session.payload.as_bytes()[session.cursor..];
        let count = rest.len().min(buf.len());
        buf[..count].copy_from_slice(&rest[..count]);
        session.cursor += count;
        count
    }

    /// Ends the session. Calling it without an open session is a no-op
    /// apart from making sure edge notification is off.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            self.sensor.cancel();
            self.capture.release();
            log_debug!("DHT11 session closed");
        } else {
            // The claim, if any, belongs to another device
            self.sensor.silence();
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Result measured when the current session was opened.
    pub fn last_result(&self) -> Option<ReadResult> {
        self.session.as_ref().map(|session| session.result)
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

impl<P, C, D> Drop for Device<'_, P, C, D> {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.capture.release();
        }
    }
}
