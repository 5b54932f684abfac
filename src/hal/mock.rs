//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware and network traits,
//! enabling development and testing on desktop without physical hardware.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockGpio`] | [`Platform`] | Records writes, fires interrupts, scripted ADC values |
//! | [`MockSensor`] | [`PositionSensor`] | Scripted angle readings |
//! | [`SimulatedShaft`] | [`DigitalOutputs`] + [`PositionSensor`] | Motor-driven shaft with constant speed |
//! | [`MockConnector`] | [`Connector`] | Scripted websocket sessions |
//! | [`MockChannel`] | [`CommandChannel`] | One scripted session |
//!
//! All mocks are cheap handles onto shared state, so a test can keep one
//! clone for inspection while the code under test owns another.
//!
//! # Example
//!
//! ```rust
//! use smart_can::hal::SimulatedShaft;
//! use smart_can::{MotorController, MotorPins};
//!
//! # tokio_test_block(async {
//! let shaft = SimulatedShaft::new(MotorPins::new(3, 4));
//! let mut motor = MotorController::new("top", shaft.clone(), shaft.clone(), MotorPins::new(3, 4), 3).unwrap();
//!
//! motor.move_to_bin(1).await.unwrap();
//! assert_eq!(motor.current_bin(), 1);
//! assert!((shaft.angle() - 120.0).abs() < 10.0);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread()
//! #         .enable_time()
//! #         .start_paused(true)
//! #         .build()
//! #         .unwrap()
//! #         .block_on(f)
//! # }
//! ```
//!
//! [`Platform`]: crate::traits::Platform
//! [`PositionSensor`]: crate::traits::PositionSensor
//! [`DigitalOutputs`]: crate::traits::DigitalOutputs
//! [`Connector`]: crate::traits::Connector
//! [`CommandChannel`]: crate::traits::CommandChannel

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::config::MotorPins;
use crate::error::{ConnectionError, HardwareError};
use crate::traits::{
    AnalogInput, CommandChannel, Connector, DigitalOutputs, Edge, InterruptCallback,
    InterruptSource, MotorState, PinState, Platform, PositionSensor,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// GPIO Mock
// ============================================================================

struct Registration {
    pin: u8,
    edge: Edge,
    debounce_ms: u32,
    last_accepted_ms: Option<u64>,
    callback: InterruptCallback,
}

#[derive(Default)]
struct GpioState {
    levels: BTreeMap<u8, PinState>,
    writes: Vec<(u8, PinState)>,
    interrupts: Vec<Registration>,
    analog_queue: BTreeMap<u8, VecDeque<u16>>,
    analog_fixed: BTreeMap<u8, u16>,
    released: bool,
    fail_writes: bool,
}

/// Mock board: digital outputs, edge interrupts and an ADC.
///
/// Interrupts fire only when the test calls [`trigger`](Self::trigger), with
/// an explicit timestamp so debounce behaviour is deterministic. Callbacks run
/// with the mock locked and must not call back into it.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
/// use smart_can::hal::MockGpio;
/// use smart_can::traits::{Edge, InterruptSource};
///
/// let gpio = MockGpio::new();
/// let hits = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&hits);
/// gpio.register_interrupt(21, Edge::Rising, 1000, Box::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// })).unwrap();
///
/// assert!(gpio.trigger(21, Edge::Rising, 0));
/// assert!(!gpio.trigger(21, Edge::Rising, 400)); // bounced
/// assert!(gpio.trigger(21, Edge::Rising, 1500));
/// assert_eq!(hits.load(Ordering::SeqCst), 2);
/// ```
#[derive(Clone, Default)]
pub struct MockGpio {
    inner: Arc<Mutex<GpioState>>,
}

impl core::fmt::Debug for MockGpio {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = lock(&self.inner);
        f.debug_struct("MockGpio")
            .field("levels", &state.levels)
            .field("interrupts", &state.interrupts.len())
            .field("released", &state.released)
            .finish()
    }
}

impl MockGpio {
    /// Creates a mock with no pins configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to `pin`, if it was ever written.
    pub fn level(&self, pin: u8) -> Option<PinState> {
        lock(&self.inner).levels.get(&pin).copied()
    }

    /// Every write in order.
    pub fn writes(&self) -> Vec<(u8, PinState)> {
        lock(&self.inner).writes.clone()
    }

    /// Number of writes so far.
    pub fn write_count(&self) -> usize {
        lock(&self.inner).writes.len()
    }

    /// Motor state currently encoded on a pin pair.
    pub fn motor_state(&self, pins: MotorPins) -> MotorState {
        let state = lock(&self.inner);
        let level = |pin| state.levels.get(&pin).copied().unwrap_or(PinState::Low);
        MotorState::from_levels(level(pins.forward), level(pins.reverse))
    }

    /// Make every later write fail with a driver error.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }

    /// Number of registered interrupts.
    pub fn interrupt_count(&self) -> usize {
        lock(&self.inner).interrupts.len()
    }

    /// Simulate a transition on `pin` at `at_ms`.
    ///
    /// Runs every matching callback whose debounce window has elapsed and
    /// returns true if at least one ran.
    pub fn trigger(&self, pin: u8, edge: Edge, at_ms: u64) -> bool {
        let mut state = lock(&self.inner);
        let mut fired = false;
        for reg in state.interrupts.iter_mut() {
            if reg.pin != pin || !reg.edge.matches(edge) {
                continue;
            }
            let bounced = reg.last_accepted_ms.is_some_and(|last| {
                reg.debounce_ms > 0 && at_ms.saturating_sub(last) < u64::from(reg.debounce_ms)
            });
            if bounced {
                continue;
            }
            reg.last_accepted_ms = Some(at_ms);
            (reg.callback)();
            fired = true;
        }
        fired
    }

    /// Queue one ADC value for `channel`. Queued values are consumed first.
    pub fn queue_analog(&self, channel: u8, value: u16) {
        lock(&self.inner)
            .analog_queue
            .entry(channel)
            .or_default()
            .push_back(value);
    }

    /// Value returned for `channel` once its queue is empty.
    pub fn set_analog(&self, channel: u8, value: u16) {
        lock(&self.inner).analog_fixed.insert(channel, value);
    }

    /// True once [`Platform::release`] has run.
    pub fn is_released(&self) -> bool {
        lock(&self.inner).released
    }
}

impl DigitalOutputs for MockGpio {
    fn write_output(&self, pin: u8, level: PinState) -> Result<(), HardwareError> {
        let mut state = lock(&self.inner);
        if state.fail_writes {
            return Err(HardwareError::Driver(format!("write to pin {pin} failed")));
        }
        state.levels.insert(pin, level);
        state.writes.push((pin, level));
        Ok(())
    }
}

impl InterruptSource for MockGpio {
    fn register_interrupt(
        &self,
        pin: u8,
        edge: Edge,
        debounce_ms: u32,
        callback: InterruptCallback,
    ) -> Result<(), HardwareError> {
        lock(&self.inner).interrupts.push(Registration {
            pin,
            edge,
            debounce_ms,
            last_accepted_ms: None,
            callback,
        });
        Ok(())
    }
}

impl AnalogInput for MockGpio {
    fn read_analog(&self, channel: u8) -> Result<u16, HardwareError> {
        let mut state = lock(&self.inner);
        if let Some(value) = state
            .analog_queue
            .get_mut(&channel)
            .and_then(VecDeque::pop_front)
        {
            return Ok(value);
        }
        state
            .analog_fixed
            .get(&channel)
            .copied()
            .ok_or(HardwareError::UnknownChannel(channel))
    }
}

impl Platform for MockGpio {
    fn release(&self) {
        let mut state = lock(&self.inner);
        for level in state.levels.values_mut() {
            *level = PinState::Low;
        }
        state.interrupts.clear();
        state.released = true;
    }
}

// ============================================================================
// Sensor Mock
// ============================================================================

/// Position sensor returning scripted angles.
///
/// Each read consumes the next queued value; once the script is exhausted the
/// last value repeats.
///
/// ```rust
/// use smart_can::hal::MockSensor;
/// use smart_can::traits::PositionSensor;
///
/// let sensor = MockSensor::new(10.0);
/// sensor.queue_reading(20.0);
/// assert_eq!(sensor.read_degrees().unwrap(), 20.0);
/// assert_eq!(sensor.read_degrees().unwrap(), 20.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockSensor {
    inner: Arc<Mutex<SensorScript>>,
}

#[derive(Debug, Default)]
struct SensorScript {
    queued: VecDeque<f32>,
    current: f32,
    reads: usize,
    fail: bool,
}

impl MockSensor {
    /// Sensor reporting `degrees` until told otherwise.
    pub fn new(degrees: f32) -> Self {
        let sensor = Self::default();
        lock(&sensor.inner).current = degrees;
        sensor
    }

    /// Queue the next reading.
    pub fn queue_reading(&self, degrees: f32) {
        lock(&self.inner).queued.push_back(degrees);
    }

    /// Make reads fail with a driver error.
    pub fn fail_reads(&self, fail: bool) {
        lock(&self.inner).fail = fail;
    }

    /// Number of reads so far.
    pub fn read_count(&self) -> usize {
        lock(&self.inner).reads
    }
}

impl PositionSensor for MockSensor {
    fn read_degrees(&self) -> Result<f32, HardwareError> {
        let mut script = lock(&self.inner);
        script.reads += 1;
        if script.fail {
            return Err(HardwareError::Driver("sensor read failed".into()));
        }
        if let Some(next) = script.queued.pop_front() {
            script.current = next;
        }
        Ok(script.current)
    }
}

// ============================================================================
// Simulated Shaft
// ============================================================================

#[derive(Debug)]
struct ShaftState {
    pins: MotorPins,
    forward: PinState,
    reverse: PinState,
    angle: f32,
    deg_per_sec: f32,
    jam_at: Option<f32>,
    updated: Instant,
    writes: usize,
}

impl ShaftState {
    fn motor_state(&self) -> MotorState {
        MotorState::from_levels(self.forward, self.reverse)
    }

    fn advance(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f32();
        self.updated = now;

        let sign = match self.motor_state() {
            MotorState::Off => return,
            MotorState::Forward => 1.0,
            MotorState::Reverse => -1.0,
        };
        let delta = self.deg_per_sec * elapsed;

        if let Some(jam) = self.jam_at {
            let gap = if sign > 0.0 {
                (jam - self.angle).rem_euclid(360.0)
            } else {
                (self.angle - jam).rem_euclid(360.0)
            };
            if gap <= delta {
                self.angle = jam;
                return;
            }
        }
        self.angle = (self.angle + sign * delta).rem_euclid(360.0);
    }
}

/// A motor-driven lid shaft for simulation and tests.
///
/// Acts as both the motor outputs and the position sensor of one lid. While
/// the motor is driven the angle changes at a constant rate measured with
/// `tokio::time`, so it follows paused test time exactly. Forward increases
/// the angle.
#[derive(Debug, Clone)]
pub struct SimulatedShaft {
    inner: Arc<Mutex<ShaftState>>,
}

impl SimulatedShaft {
    /// Shaft at 0° turning 60°/s when driven.
    pub fn new(pins: MotorPins) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ShaftState {
                pins,
                forward: PinState::Low,
                reverse: PinState::Low,
                angle: 0.0,
                deg_per_sec: 60.0,
                jam_at: None,
                updated: Instant::now(),
                writes: 0,
            })),
        }
    }

    /// Start at `degrees`.
    pub fn with_angle(self, degrees: f32) -> Self {
        lock(&self.inner).angle = degrees.rem_euclid(360.0);
        self
    }

    /// Turn at `deg_per_sec` when driven.
    pub fn with_speed(self, deg_per_sec: f32) -> Self {
        lock(&self.inner).deg_per_sec = deg_per_sec;
        self
    }

    /// Stick permanently once the shaft reaches `degrees`.
    pub fn with_jam_at(self, degrees: f32) -> Self {
        lock(&self.inner).jam_at = Some(degrees.rem_euclid(360.0));
        self
    }

    /// Current angle in degrees.
    pub fn angle(&self) -> f32 {
        let mut state = lock(&self.inner);
        state.advance();
        state.angle
    }

    /// Motor state currently applied.
    pub fn state(&self) -> MotorState {
        lock(&self.inner).motor_state()
    }

    /// Number of pin writes so far.
    pub fn write_count(&self) -> usize {
        lock(&self.inner).writes
    }
}

impl DigitalOutputs for SimulatedShaft {
    fn write_output(&self, pin: u8, level: PinState) -> Result<(), HardwareError> {
        let mut state = lock(&self.inner);
        state.advance();
        if pin == state.pins.forward {
            state.forward = level;
        } else if pin == state.pins.reverse {
            state.reverse = level;
        } else {
            return Err(HardwareError::UnknownPin(pin));
        }
        state.writes += 1;
        Ok(())
    }
}

impl PositionSensor for SimulatedShaft {
    fn read_degrees(&self) -> Result<f32, HardwareError> {
        Ok(self.angle())
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// One scripted session: frames delivered in order, then the peer closes.
pub type SessionScript = Vec<Result<String, ConnectionError>>;

#[derive(Debug, Default)]
struct ConnectorState {
    sessions: VecDeque<Result<SessionScript, ConnectionError>>,
    attempts: Vec<Instant>,
    urls: Vec<String>,
    sent: Vec<String>,
}

/// Connector replaying scripted sessions.
///
/// Each [`connect`](Connector::connect) consumes the next script. Once the
/// scripts run out every attempt fails. Frames sent on any session are
/// collected in one shared log.
///
/// ```rust
/// use smart_can::hal::MockConnector;
///
/// let connector = MockConnector::new()
///     .with_session(vec![r#"{"command":"identify"}"#])
///     .with_refusal();
/// assert_eq!(connector.attempt_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    /// Connector with no scripted sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session delivering `frames`, then closing.
    pub fn with_session<S: Into<String>>(self, frames: Vec<S>) -> Self {
        let script = frames.into_iter().map(|f| Ok(f.into())).collect();
        self.with_script(script)
    }

    /// Add a session with explicit per-frame results.
    pub fn with_script(self, script: SessionScript) -> Self {
        lock(&self.inner).sessions.push_back(Ok(script));
        self
    }

    /// Add a failed connection attempt.
    pub fn with_refusal(self) -> Self {
        lock(&self.inner)
            .sessions
            .push_back(Err(ConnectionError::Connect("connection refused".into())));
        self
    }

    /// Number of connection attempts so far.
    pub fn attempt_count(&self) -> usize {
        lock(&self.inner).attempts.len()
    }

    /// When each attempt was made.
    pub fn attempt_times(&self) -> Vec<Instant> {
        lock(&self.inner).attempts.clone()
    }

    /// URLs passed to each attempt.
    pub fn urls(&self) -> Vec<String> {
        lock(&self.inner).urls.clone()
    }

    /// Every frame sent on any session.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.inner).sent.clone()
    }
}

impl Connector for MockConnector {
    type Channel = MockChannel;

    async fn connect(&mut self, url: &str) -> Result<MockChannel, ConnectionError> {
        let mut state = lock(&self.inner);
        state.attempts.push(Instant::now());
        state.urls.push(url.to_string());
        let script = state
            .sessions
            .pop_front()
            .unwrap_or_else(|| Err(ConnectionError::Connect("no server scripted".into())))?;
        Ok(MockChannel {
            incoming: script.into(),
            connector: Arc::clone(&self.inner),
        })
    }
}

/// One session produced by [`MockConnector`].
#[derive(Debug)]
pub struct MockChannel {
    incoming: VecDeque<Result<String, ConnectionError>>,
    connector: Arc<Mutex<ConnectorState>>,
}

impl CommandChannel for MockChannel {
    async fn recv(&mut self) -> Option<Result<String, ConnectionError>> {
        self.incoming.pop_front()
    }

    async fn send(&mut self, frame: String) -> Result<(), ConnectionError> {
        lock(&self.connector).sent.push(frame);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
