//! Edge-driven protocol decoder.
//!
//! After the host's wake pulse the sensor answers with an 80us low and an
//! 80us high pulse, then sends 40 bits. Every bit is a ~50us low followed by
//! a high whose width carries the value: ~26us for a 0, ~70us for a 1.
//!
//! ```txt
//!     response       bit 0         bit 1
//!   ┌──────┐      ┌───┐         ┌───────┐
//! ──┘      └──────┘   └─────────┘       └───
//!  80us    80us  50us 26us  50us  70us
//! ```
//!
//! The decoder is stepped once per edge from the edge callback. The width of
//! a high pulse is measured on the falling edge that ends it.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::clock::Clock;
use crate::error::PinError;
use crate::pin::{Level, PinController};

/// Bytes in one sensor frame, checksum included.
pub const FRAME_BYTES: usize = 5;

/// Pulse width boundaries used to classify edges, in microseconds.
///
/// Different sensor batches drift slightly, so every boundary can be
/// overridden.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    /// Pulses shorter than this are glitches.
    pub noise_min_us: u32,
    /// Longest high pulse still read as a 0 bit.
    pub zero_max_us: u32,
    /// Pulses longer than this are glitches.
    pub noise_max_us: u32,
    /// Minimum width of the response high pulse that marks the start
    /// condition.
    pub start_high_min_us: u32,
}

impl Thresholds {
    pub const NOISE_MIN_US: u32 = 15;
    pub const ZERO_MAX_US: u32 = 60;
    pub const NOISE_MAX_US: u32 = 80;
    pub const START_HIGH_MIN_US: u32 = 40;

    pub const fn new() -> Self {
        Thresholds {
            noise_min_us: Self::NOISE_MIN_US,
            zero_max_us: Self::ZERO_MAX_US,
            noise_max_us: Self::NOISE_MAX_US,
            start_high_min_us: Self::START_HIGH_MIN_US,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new()
    }
}

/// What a single edge did to the capture.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// Not armed, or the frame is already complete.
    Ignored,
    /// Pulse width out of bounds; nothing changed.
    Noise,
    /// Edge accepted as a timing reference only.
    Timestamp,
    /// The start condition was recognised.
    Started,
    /// A bit was appended.
    Bit(bool),
    /// The 40th bit was appended.
    Complete,
}

/// Decoder state of one read attempt.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureState {
    started: bool,
    primed: bool,
    bit: u8,
    byte: u8,
    bytes: [u8; FRAME_BYTES],
    last_edge_us: u64,
}

impl CaptureState {
    /// Fresh state whose first pulse is measured from `now_us`.
    pub const fn new(now_us: u64) -> Self {
        CaptureState {
            started: false,
            primed: false,
            bit: 0,
            byte: 0,
            bytes: [0; FRAME_BYTES],
            last_edge_us: now_us,
        }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Bit position inside the current byte, `0..8`.
    pub fn bit_index(&self) -> u8 {
        self.bit
    }

    /// Number of complete bytes, `0..=5`.
    pub fn byte_index(&self) -> u8 {
        self.byte
    }

    pub fn bytes(&self) -> [u8; FRAME_BYTES] {
        self.bytes
    }

    pub fn is_complete(&self) -> bool {
        usize::from(self.byte) >= FRAME_BYTES
    }

    /// Feeds one edge: `level` is the line level after the transition.
    pub fn step(&mut self, level: Level, now_us: u64, thresholds: &Thresholds) -> EdgeOutcome {
        if self.is_complete() {
            return EdgeOutcome::Ignored;
        }

        let elapsed = u32::try_from(now_us.saturating_sub(self.last_edge_us)).unwrap_or(u32::MAX);

        if !self.started {
            self.last_edge_us = now_us;
            return match level {
                // End of the response low pulse
                Level::High => {
                    self.primed = true;
                    EdgeOutcome::Timestamp
                }
                Level::Low if self.primed && elapsed > thresholds.start_high_min_us => {
                    self.started = true;
                    EdgeOutcome::Started
                }
                Level::Low => EdgeOutcome::Timestamp,
            };
        }

        if elapsed < thresholds.noise_min_us || elapsed > thresholds.noise_max_us {
            return EdgeOutcome::Noise;
        }
        self.last_edge_us = now_us;

        if level.is_high() {
            return EdgeOutcome::Timestamp;
        }

        let one = elapsed > thresholds.zero_max_us;
        if one {
            self.bytes[usize::from(self.byte)] |= 1 << (7 - self.bit);
        }

        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.byte += 1;
            if self.is_complete() {
                return EdgeOutcome::Complete;
            }
        }
        EdgeOutcome::Bit(one)
    }
}

struct Slot {
    claimed: bool,
    armed: bool,
    thresholds: Thresholds,
    state: CaptureState,
}

/// Capture slot shared between the host and the edge callback.
///
/// The `armed` flag decides who may write the state: the host while it is
/// cleared (and edge notification is off), the edge callback while it is
/// set. Every access is a short critical section; none is held across a
/// delay.
///
/// The slot also carries the session claim: whoever holds it is the only
/// one allowed to run attempts on the line.
///
/// Typically placed in a `static` so the interrupt handler can reach it:
///
/// ```
/// use dht11_irq::EdgeCapture;
///
/// static CAPTURE: EdgeCapture = EdgeCapture::new();
/// ```
pub struct EdgeCapture {
    slot: Mutex<CriticalSectionRawMutex, RefCell<Slot>>,
}

impl EdgeCapture {
    pub const fn new() -> Self {
        EdgeCapture {
            slot: Mutex::new(RefCell::new(Slot {
                claimed: false,
                armed: false,
                thresholds: Thresholds::new(),
                state: CaptureState::new(0),
            })),
        }
    }

    /// Claims the line for a session. Returns `false` if it is already
    /// claimed.
    pub fn claim(&self) -> bool {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.claimed {
                return false;
            }
            slot.claimed = true;
            true
        })
    }

    /// Gives the session claim back.
    pub fn release(&self) {
        self.slot.lock(|slot| slot.borrow_mut().claimed = false)
    }

    pub fn is_claimed(&self) -> bool {
        self.slot.lock(|slot| slot.borrow().claimed)
    }

    /// Resets the state and hands it to the edge callback.
    ///
    /// Host side; edge notification must be disabled.
    pub fn arm(&self, now_us: u64, thresholds: Thresholds) {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            slot.thresholds = thresholds;
            slot.state = CaptureState::new(now_us);
            slot.armed = true;
        })
    }

    /// Takes the state back from the edge callback.
    ///
    /// Host side; edge notification must already be disabled.
    pub fn disarm(&self) -> CaptureState {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            slot.armed = false;
            slot.state
        })
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock(|slot| slot.borrow().armed)
    }

    /// Whether all 40 bits have arrived. Safe to call while armed.
    pub fn is_complete(&self) -> bool {
        self.slot.lock(|slot| slot.borrow().state.is_complete())
    }

    /// Copy of the current state. Safe to call while armed.
    pub fn snapshot(&self) -> CaptureState {
        self.slot.lock(|slot| slot.borrow().state)
    }

    /// Steps the decoder with an edge observed at `now_us`.
    pub fn on_edge(&self, level: Level, now_us: u64) -> EdgeOutcome {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if !slot.armed {
                return EdgeOutcome::Ignored;
            }
            let thresholds = slot.thresholds;
            slot.state.step(level, now_us, &thresholds)
        })
    }

    /// Edge callback body: samples the line and the clock, acknowledges the
    /// notification, then steps the decoder.
    ///
    /// Never blocks. Call it from the GPIO interrupt handler of the sensor
    /// line.
    pub fn handle_edge<P, C>(&self, pin: &mut P, clock: &C) -> Result<EdgeOutcome, PinError>
    where
        P: PinController + ?Sized,
        C: Clock + ?Sized,
    {
        let level = pin.read_level()?;
        let now_us = clock.now_us();
        pin.acknowledge_edge()?;
        Ok(self.on_edge(level, now_us))
    }
}

impl Default for EdgeCapture {
    fn default() -> Self {
        Self::new()
    }
}
