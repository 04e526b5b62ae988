//! Simulated sensor line for the unit tests.
//!
//! [`SimClock`] is advanced only by [`SimDelay`], so tests run without real
//! waiting. Once the driver enables edge notification, the first delay it
//! takes replays the next scripted [`Response`] through
//! [`EdgeCapture::handle_edge`], the same way a GPIO interrupt would.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use crate::clock::Clock;
use crate::decoder::{EdgeCapture, FRAME_BYTES};
use crate::error::PinError;
use crate::pin::{Direction, Edge, Level, PinConfig, PinController, PinId};

#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_us(&self, us: u64) {
        self.0.set(self.0.get() + us);
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        self.0.get()
    }
}

/// Pin operation recorded by [`MockPin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Direction(Direction),
    Write(Level),
    EnableEdges(Edge),
    DisableEdges,
    Acknowledge,
}

struct Line {
    config: PinConfig,
    edges: Option<Edge>,
    unavailable: bool,
    fail_next: Option<Op>,
    ops: Vec<(u64, Op)>,
}

/// Shared handle on a simulated line. Clones see the same line.
#[derive(Clone)]
pub struct MockPin {
    line: Rc<RefCell<Line>>,
    clock: SimClock,
}

impl MockPin {
    pub fn new(pin: PinId, clock: SimClock) -> Self {
        MockPin {
            line: Rc::new(RefCell::new(Line {
                config: PinConfig::released(pin),
                edges: None,
                unavailable: false,
                fail_next: None,
                ops: Vec::new(),
            })),
            clock,
        }
    }

    /// Sets the line level from the sensor side.
    pub fn drive(&self, level: Level) {
        self.line.borrow_mut().config.level = level;
    }

    /// Makes every operation fail with `HardwareUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.line.borrow_mut().unavailable = unavailable;
    }

    /// Makes the next `op` fail with `HardwareUnavailable`, once.
    pub fn fail_next(&self, op: Op) {
        self.line.borrow_mut().fail_next = Some(op);
    }

    pub fn edges_enabled(&self) -> bool {
        self.line.borrow().edges.is_some()
    }

    pub fn config(&self) -> PinConfig {
        self.line.borrow().config
    }

    /// Recorded operations with the time they happened at.
    pub fn ops(&self) -> Vec<(u64, Op)> {
        self.line.borrow().ops.clone()
    }

    /// Recorded operations without acknowledgements.
    pub fn control_ops(&self) -> Vec<(u64, Op)> {
        self.ops()
            .into_iter()
            .filter(|(_, op)| *op != Op::Acknowledge)
            .collect()
    }

    fn record(&self, op: Op) -> Result<(), PinError> {
        let mut line = self.line.borrow_mut();
        if line.unavailable {
            return Err(PinError::HardwareUnavailable);
        }
        if line.fail_next == Some(op) {
            line.fail_next = None;
            return Err(PinError::HardwareUnavailable);
        }
        line.ops.push((self.clock.now_us(), op));
        Ok(())
    }
}

impl PinController for MockPin {
    fn pin(&self) -> PinId {
        self.line.borrow().config.pin
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), PinError> {
        self.record(Op::Direction(direction))?;
        let mut line = self.line.borrow_mut();
        line.config.direction = direction;
        if direction == Direction::Input {
            line.config.level = Level::High;
        }
        Ok(())
    }

    fn write_level(&mut self, level: Level) -> Result<(), PinError> {
        self.record(Op::Write(level))?;
        self.line.borrow_mut().config.level = level;
        Ok(())
    }

    fn read_level(&mut self) -> Result<Level, PinError> {
        let line = self.line.borrow();
        if line.unavailable {
            return Err(PinError::HardwareUnavailable);
        }
        Ok(line.config.level)
    }

    fn enable_edge_notify(&mut self, edge: Edge) -> Result<(), PinError> {
        self.record(Op::EnableEdges(edge))?;
        self.line.borrow_mut().edges = Some(edge);
        Ok(())
    }

    fn disable_edge_notify(&mut self) -> Result<(), PinError> {
        self.record(Op::DisableEdges)?;
        self.line.borrow_mut().edges = None;
        Ok(())
    }

    fn acknowledge_edge(&mut self) -> Result<(), PinError> {
        self.record(Op::Acknowledge)
    }
}

/// What the simulated sensor sends after one wake pulse.
#[derive(Clone, Debug)]
pub enum Response {
    /// A well-formed transmission of these bytes.
    Frame([u8; FRAME_BYTES]),
    /// No edges at all.
    Silent,
    /// Raw `(microseconds since previous edge, level after edge)` pairs.
    Edges(Vec<(u32, Level)>),
}

/// Edges of a well-formed transmission: response pulses, 40 bits, release.
pub fn frame_edges(bytes: [u8; FRAME_BYTES]) -> Vec<(u32, Level)> {
    let mut edges = vec![(20, Level::Low), (80, Level::High), (80, Level::Low)];
    for byte in bytes {
        for i in 0..8 {
            let one = (byte >> (7 - i)) & 1 == 1;
            edges.push((50, Level::High));
            edges.push((if one { 70 } else { 26 }, Level::Low));
        }
    }
    edges.push((50, Level::High));
    edges
}

/// Delay that advances a [`SimClock`] and plays the sensor's part.
pub struct SimDelay<'a> {
    clock: SimClock,
    line: MockPin,
    capture: &'a EdgeCapture,
    responses: VecDeque<Response>,
    replayed: bool,
}

impl<'a> SimDelay<'a> {
    pub fn new(clock: SimClock, line: MockPin, capture: &'a EdgeCapture) -> Self {
        SimDelay {
            clock,
            line,
            capture,
            responses: VecDeque::new(),
            replayed: false,
        }
    }

    /// Queues the answer to the next wake pulse.
    pub fn respond(mut self, response: Response) -> Self {
        self.responses.push_back(response);
        self
    }

    fn sleep_us(&mut self, us: u64) {
        let start = self.clock.now_us();

        if self.line.edges_enabled() {
            if !self.replayed {
                self.replayed = true;
                if let Some(response) = self.responses.pop_front() {
                    self.replay(response);
                }
            }
        } else {
            self.replayed = false;
        }

        let spent = self.clock.now_us() - start;
        if spent < us {
            self.clock.advance_us(us - spent);
        }
    }

    fn replay(&mut self, response: Response) {
        let edges = match response {
            Response::Frame(bytes) => frame_edges(bytes),
            Response::Silent => Vec::new(),
            Response::Edges(edges) => edges,
        };

        for (width, level) in edges {
            self.clock.advance_us(u64::from(width));
            self.line.drive(level);
            self.capture
                .handle_edge(&mut self.line, &self.clock)
                .expect("edge callback failed");
        }
    }
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.sleep_us(u64::from(ns).div_ceil(1_000));
    }

    fn delay_us(&mut self, us: u32) {
        self.sleep_us(u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.sleep_us(u64::from(ms) * 1_000);
    }
}
