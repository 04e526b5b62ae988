use embedded_hal::delay::DelayNs;

use crate::clock::Clock;
use crate::decoder::{CaptureState, EdgeCapture, FRAME_BYTES, Thresholds};
use crate::error::PinError;
use crate::pin::{Direction, Edge, Level, PinController};

/// Timing of the read sequence.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadTimings {
    /// How long the host holds the line low to wake the sensor (>= 18 ms).
    pub wake_low_ms: u32,
    /// How long the host drives the line high before releasing it (20-40 us).
    pub wake_high_us: u32,
    /// Deadline for the 40-bit transmission after arming.
    pub settle_ms: u32,
    /// Polling interval while waiting for the transmission.
    pub poll_us: u32,
    /// Minimum spacing between the end of one attempt and the next wake pulse.
    pub cool_off_ms: u32,
    /// Retries after the first failed attempt.
    pub max_retries: u8,
    /// Upper bound on the whole read, retries included. `None` leaves it to
    /// `max_retries`.
    pub read_deadline_ms: Option<u32>,
}

impl ReadTimings {
    pub const fn new() -> Self {
        ReadTimings {
            wake_low_ms: 18,
            wake_high_us: 30,
            settle_ms: 10,
            poll_us: 500,
            cool_off_ms: 2_000,
            max_retries: 4,
            read_deadline_ms: None,
        }
    }

    /// Worst-case length of one attempt, in microseconds.
    pub const fn attempt_us(&self) -> u64 {
        self.wake_low_ms as u64 * 1_000 + self.wake_high_us as u64 + self.settle_ms as u64 * 1_000
    }
}

impl Default for ReadTimings {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a single attempt produced no usable frame. Handled by retrying.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptError {
    /// All 40 bits arrived but the checksum byte does not match.
    ChecksumMismatch,
    /// The transmission did not complete before the deadline.
    NoResponse,
}

/// True when `bytes[4]` is the non-zero sum of the first four bytes, mod 256.
pub fn checksum_ok(bytes: &[u8; FRAME_BYTES]) -> bool {
    let sum = bytes[..4].iter().fold(0u8, |sum, v| sum.wrapping_add(*v));
    bytes[4] != 0 && sum == bytes[4]
}

/// Outcome of a complete read, retries included.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadResult {
    bytes: [u8; FRAME_BYTES],
    valid: bool,
    retries: u8,
}

impl ReadResult {
    /// Result for a fully captured frame; validity follows the checksum.
    pub fn new(bytes: [u8; FRAME_BYTES], retries: u8) -> Self {
        ReadResult {
            bytes,
            valid: checksum_ok(&bytes),
            retries,
        }
    }

    /// Result of an exhausted read carrying the last captured bytes.
    pub fn failed(bytes: [u8; FRAME_BYTES], retries: u8) -> Self {
        ReadResult {
            bytes,
            valid: false,
            retries,
        }
    }

    /// `[humidity_int, humidity_frac, temperature_int, temperature_frac, checksum]`
    pub fn bytes(&self) -> [u8; FRAME_BYTES] {
        self.bytes
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Retries spent before this result was produced.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Decodes the measurement, if the frame is valid.
    pub fn reading(&self) -> Option<Reading> {
        if !self.valid {
            return None;
        }

        let [hum_int, hum_frac, temp_int, temp_frac, _] = self.bytes;
        let relative_humidity = f32::from(hum_int) + f32::from(hum_frac) / 10.0;

        // Bit 7 of the fraction byte carries the sign on newer DHT11 revisions
        let is_temp_negative = (temp_frac >> 7) != 0;
        let mut temperature = f32::from(temp_int) + f32::from(temp_frac & 0b0111_1111) / 10.0;
        if is_temp_negative {
            temperature = -temperature;
        }

        Some(Reading {
            temperature,
            relative_humidity,
        })
    }
}

/// Measurement decoded from a valid frame.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub relative_humidity: f32,
}

/// Read sequencer for the DHT11.
///
/// Drives the wake handshake, hands the line to the edge callback through
/// an [`EdgeCapture`], waits for the frame and validates it, retrying with
/// the sensor's mandatory cool-off between attempts.
///
/// The platform must call [`EdgeCapture::handle_edge`] from the GPIO
/// interrupt of the sensor line, with the same capture passed here.
pub struct Dht11<'a, P, C, D> {
    pin: P,
    clock: C,
    delay: D,
    capture: &'a EdgeCapture,
    timings: ReadTimings,
    thresholds: Thresholds,
    last_attempt_end_us: Option<u64>,
}

impl<'a, P, C, D> Dht11<'a, P, C, D>
where
    P: PinController,
    C: Clock,
    D: DelayNs,
{
    /// Creates a new instance of the DHT11 driver.
    ///
    /// # Arguments
    ///
    /// * `pin` - Controller of the GPIO line the sensor is wired to.
    /// * `clock` - Monotonic clock shared with the edge callback.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    /// * `capture` - Capture slot the edge callback writes into.
    pub fn new(pin: P, clock: C, delay: D, capture: &'a EdgeCapture) -> Self {
        Dht11 {
            pin,
            clock,
            delay,
            capture,
            timings: ReadTimings::new(),
            thresholds: Thresholds::new(),
            last_attempt_end_us: None,
        }
    }

    pub fn with_timings(mut self, timings: ReadTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn timings(&self) -> &ReadTimings {
        &self.timings
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }

    /// Claims the line and parks it idle (output, high).
    pub fn init(&mut self) -> Result<(), PinError> {
        self.pin.disable_edge_notify()?;
        self.pin.set_direction(Direction::Output)?;
        self.pin.write_level(Level::High)
    }

    /// Reads one frame from the sensor.
    ///
    /// Checksum failures and missing responses are retried up to
    /// `max_retries` times; when the retries run out the result is returned
    /// with its validity flag cleared. Only pin failures are errors, and
    /// edge notification is off again when one is returned.
    pub fn read(&mut self) -> Result<ReadResult, PinError> {
        let started_us = self.clock.now_us();
        let mut retries = 0;

        loop {
            self.cool_off();

            let state = match self.attempt() {
                Ok(state) => state,
                Err(e) => {
                    log_error!("DHT11 on GPIO {}: pin failure during read", self.pin.pin().number());
                    // The sensor may already have been woken
                    self.last_attempt_end_us = Some(self.clock.now_us());
                    self.cancel();
                    return Err(e);
                }
            };
            self.last_attempt_end_us = Some(self.clock.now_us());

            let bytes = state.bytes();
            let err = match validate(&state) {
                Ok(()) => {
                    log_debug!("DHT11 frame {:?} after {} retries", bytes, retries);
                    return Ok(ReadResult::new(bytes, retries));
                }
                Err(err) => err,
            };

            if retries >= self.timings.max_retries || !self.retry_fits_deadline(started_us) {
                log_error!("DHT11 read failed after {} retries: {:?}", retries, err);
                return Ok(ReadResult::failed(bytes, retries));
            }

            retries += 1;
            log_warn!(
                "DHT11 attempt failed ({:?}), retry {} of {}",
                err,
                retries,
                self.timings.max_retries
            );
        }
    }

    /// Turns edge notification off and takes the capture back from the
    /// edge callback. Safe to call at any time.
    pub fn cancel(&mut self) {
        self.silence();
        self.capture.disarm();
    }

    /// Turns edge notification off, leaving the capture alone.
    pub fn silence(&mut self) {
        if self.pin.disable_edge_notify().is_err() {
            log_warn!("DHT11 on GPIO {}: could not disable edge notification", self.pin.pin().number());
        }
    }

    fn attempt(&mut self) -> Result<CaptureState, PinError> {
        self.wake()?;
        self.arm()?;
        self.settle();
        self.pin.disable_edge_notify()?;
        Ok(self.capture.disarm())
    }

    /// Sends the start signal: the line is held low long enough for the
    /// sensor to notice, briefly driven high, then released.
    fn wake(&mut self) -> Result<(), PinError> {
        self.pin.set_direction(Direction::Output)?;
        self.pin.write_level(Level::Low)?;
        self.delay.delay_ms(self.timings.wake_low_ms);
        self.pin.write_level(Level::High)?;
        self.delay.delay_us(self.timings.wake_high_us);
        self.pin.set_direction(Direction::Input)
    }

    fn arm(&mut self) -> Result<(), PinError> {
        self.capture.arm(self.clock.now_us(), self.thresholds);
        self.pin.enable_edge_notify(Edge::Both)
    }

    /// Waits until the frame is complete or the settle window has passed.
    ///
    /// The poll count is bounded as well, so a stalled clock cannot keep the
    /// host here forever.
    fn settle(&mut self) {
        let armed_at = self.clock.now_us();
        let window_us = u64::from(self.timings.settle_ms) * 1_000;
        let poll_us = self.timings.poll_us.max(1);
        let max_polls = window_us.div_ceil(u64::from(poll_us));

        for _ in 0..max_polls {
            if self.capture.is_complete() {
                return;
            }
            if self.clock.now_us().saturating_sub(armed_at) >= window_us {
                return;
            }
            self.delay.delay_us(poll_us);
        }
    }

    /// Keeps the sensor's minimum spacing between measurements.
    fn cool_off(&mut self) {
        let Some(end) = self.last_attempt_end_us else {
            return;
        };
        let min_us = u64::from(self.timings.cool_off_ms) * 1_000;
        let since = self.clock.now_us().saturating_sub(end);
        if since < min_us {
            let remaining = u32::try_from(min_us - since).unwrap_or(u32::MAX);
            log_trace!("DHT11 cooling off for {} us", remaining);
            self.delay.delay_us(remaining);
        }
    }

    fn retry_fits_deadline(&self, started_us: u64) -> bool {
        let Some(deadline_ms) = self.timings.read_deadline_ms else {
            return true;
        };
        let next_end = self.clock.now_us().saturating_sub(started_us)
            + u64::from(self.timings.cool_off_ms) * 1_000
            + self.timings.attempt_us();
        next_end <= u64::from(deadline_ms) * 1_000
    }
}

fn validate(state: &CaptureState) -> Result<(), AttemptError> {
    if !state.is_complete() {
        Err(AttemptError::NoResponse)
    } else if !checksum_ok(&state.bytes()) {
        Err(AttemptError::ChecksumMismatch)
    } else {
        Ok(())
    }
}
