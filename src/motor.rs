//! Single-motor position control.
//!
//! A [`MotorController`] owns one DC motor (two enable outputs) and the
//! position sensor on its shaft. Moves are open-loop time slices with a
//! position check between slices: the motor keeps running while it is still
//! getting closer to the target and stops the moment it is not.
//!
//! # Direction convention
//!
//! [`Rotation::Forward`] increases the sensor angle, [`Rotation::Reverse`]
//! decreases it.
//!
//! # Example
//!
//! ```rust
//! use smart_can::motor::{shortest_path, Rotation};
//!
//! let plan = shortest_path(10.0, 200.0);
//! assert_eq!(plan.rotation, Rotation::Reverse);
//! assert_eq!(plan.degrees, 170.0);
//! ```

use core::fmt;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{sleep, Instant};

use crate::config::{MotionConfig, MotorPins};
use crate::error::{ControlError, HardwareError};
use crate::traits::{DigitalOutputs, MotorState, PinState, PositionSensor};

// ============================================================================
// Path planning
// ============================================================================

/// Direction of a move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    /// Towards increasing angles.
    Forward,
    /// Towards decreasing angles.
    Reverse,
}

impl Rotation {
    /// Motor state that produces this rotation.
    pub const fn motor_state(self) -> MotorState {
        match self {
            Rotation::Forward => MotorState::Forward,
            Rotation::Reverse => MotorState::Reverse,
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.motor_state().as_str())
    }
}

/// How far and which way to turn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathPlan {
    /// Angle to cover, within `[0, 180]`.
    pub degrees: f32,
    /// Direction to turn.
    pub rotation: Rotation,
}

/// Shortest way round from `current` to `target` (both in `[0, 360)`).
pub fn shortest_path(current: f32, target: f32) -> PathPlan {
    let distance = (target - current).abs();
    let reverse =
        (distance <= 180.0 && target < current) || (distance > 180.0 && target > current);
    PathPlan {
        degrees: if distance > 180.0 {
            360.0 - distance
        } else {
            distance
        },
        rotation: if reverse {
            Rotation::Reverse
        } else {
            Rotation::Forward
        },
    }
}

/// Distance between two angles going the short way round.
pub fn circular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// True while a move from `start` towards `target` should keep going.
///
/// Holds when the latest sample `curr` is strictly closer to the target than
/// the previous sample `last`, or when the move has to cross 0° and the shaft
/// has not crossed it yet.
pub fn still_approaching(start: f32, target: f32, last: f32, curr: f32, rotation: Rotation) -> bool {
    if circular_distance(curr, target) < circular_distance(last, target) {
        return true;
    }
    match rotation {
        Rotation::Forward => target < start && curr > start,
        Rotation::Reverse => target > start && curr < start,
    }
}

// ============================================================================
// Motor controller
// ============================================================================

/// Drives one lid motor to bin positions.
///
/// The motor's two outputs are written only through this controller. Only
/// one encoding of OFF is ever written: both outputs low.
pub struct MotorController<S, O> {
    name: String,
    sensor: S,
    outputs: O,
    pins: MotorPins,
    num_bins: u8,
    current_bin: u8,
    state: MotorState,
    motion: MotionConfig,
}

impl<S, O> fmt::Debug for MotorController<S, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotorController")
            .field("name", &self.name)
            .field("pins", &self.pins)
            .field("num_bins", &self.num_bins)
            .field("current_bin", &self.current_bin)
            .field("state", &self.state)
            .finish()
    }
}

impl<S: PositionSensor, O: DigitalOutputs> MotorController<S, O> {
    /// Create a controller and drive the motor OFF.
    ///
    /// Fails if `num_bins` is zero or the outputs cannot be written.
    pub fn new(
        name: impl Into<String>,
        sensor: S,
        outputs: O,
        pins: MotorPins,
        num_bins: u8,
    ) -> Result<Self, ControlError> {
        let name = name.into();
        if num_bins == 0 {
            return Err(ControlError::Configuration(format!(
                "{name} motor needs at least one bin"
            )));
        }
        if pins.forward == pins.reverse {
            return Err(ControlError::Configuration(format!(
                "{name} motor uses pin {} for both directions",
                pins.forward
            )));
        }
        let mut motor = Self {
            name,
            sensor,
            outputs,
            pins,
            num_bins,
            current_bin: 0,
            state: MotorState::Off,
            motion: MotionConfig::default(),
        };
        motor.write_state(MotorState::Off)?;
        Ok(motor)
    }

    /// Use `motion` for slice timing.
    pub fn with_motion(mut self, motion: MotionConfig) -> Self {
        self.motion = motion;
        self
    }

    /// Controller name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of bins
    pub fn num_bins(&self) -> u8 {
        self.num_bins
    }

    /// Last bin this motor was commanded to and reached
    pub fn current_bin(&self) -> u8 {
        self.current_bin
    }

    /// State last written to the outputs
    pub fn state(&self) -> MotorState {
        self.state
    }

    /// Angle covered by one bin
    pub fn degrees_per_bin(&self) -> f32 {
        360.0 / f32::from(self.num_bins)
    }

    /// Angle of the opening position of `bin`.
    pub fn get_bin_location(&self, bin: u8) -> f32 {
        self.degrees_per_bin() * f32::from(bin)
    }

    /// Write `state` to both outputs.
    ///
    /// The output going low is written first, so the two outputs are never
    /// high together.
    pub fn set_state(&mut self, state: MotorState) -> Result<(), HardwareError> {
        self.write_state(state)
    }

    /// Drive the motor OFF.
    pub fn stop(&mut self) -> Result<(), HardwareError> {
        self.write_state(MotorState::Off)
    }

    fn write_state(&mut self, state: MotorState) -> Result<(), HardwareError> {
        let (forward, reverse) = state.levels();
        if forward == PinState::Low {
            self.outputs.write_output(self.pins.forward, forward)?;
            self.outputs.write_output(self.pins.reverse, reverse)?;
        } else {
            self.outputs.write_output(self.pins.reverse, reverse)?;
            self.outputs.write_output(self.pins.forward, forward)?;
        }
        self.state = state;
        Ok(())
    }

    /// Turn the opening to `bin` the short way round.
    ///
    /// Does nothing if the motor was last commanded to `bin`. The cached bin
    /// is updated only after a successful move.
    pub async fn move_to_bin(&mut self, bin: u8) -> Result<(), ControlError> {
        if bin >= self.num_bins {
            return Err(ControlError::BinOutOfRange {
                bin,
                num_bins: self.num_bins,
            });
        }
        if bin == self.current_bin {
            debug!("{}: already at bin {bin}", self.name);
            return Ok(());
        }

        let current = self.sensor.read_degrees()?;
        let target = self.get_bin_location(bin);
        let plan = shortest_path(current, target);
        info!(
            "{}: bin {} -> {bin} ({current:.1}° -> {target:.1}°, {:.1}° {})",
            self.name, self.current_bin, plan.degrees, plan.rotation
        );

        if plan.degrees > 0.0 {
            self.move_degrees(plan.degrees, plan.rotation).await?;
        }
        self.current_bin = bin;
        Ok(())
    }

    /// Turn roughly `degrees` in `rotation`, stopping once the shaft stops
    /// getting closer to the target.
    ///
    /// Without [`MotionConfig::max_move_ms`] there is no upper bound on how
    /// long this runs.
    pub async fn move_degrees(&mut self, degrees: f32, rotation: Rotation) -> Result<(), ControlError> {
        let start = self.sensor.read_degrees()?;
        let target = match rotation {
            Rotation::Forward => (start + degrees).rem_euclid(360.0),
            Rotation::Reverse => (start - degrees).rem_euclid(360.0),
        };
        let started = Instant::now();

        self.move_seconds(self.motion.initial_slice(), rotation).await?;
        let mut last = start;
        let mut curr = self.sensor.read_degrees()?;
        debug!(
            "{}: start {start:.1}° last {last:.1}° current {curr:.1}° target {target:.1}°",
            self.name
        );

        while still_approaching(start, target, last, curr, rotation) {
            if let Some(limit) = self.motion.max_move() {
                if started.elapsed() >= limit {
                    warn!(
                        "{}: gave up after {limit:?} at {curr:.1}° (target {target:.1}°)",
                        self.name
                    );
                    return Err(ControlError::MoveTimeout(limit));
                }
            }
            self.move_seconds(self.motion.slice(), rotation).await?;
            last = curr;
            curr = self.sensor.read_degrees()?;
        }

        debug!("{}: stopped at {curr:.1}° (target {target:.1}°)", self.name);
        Ok(())
    }

    /// Run the motor in `rotation` for `duration`, then drive it OFF.
    pub async fn move_seconds(&mut self, duration: Duration, rotation: Rotation) -> Result<(), ControlError> {
        if let Err(e) = self.write_state(rotation.motor_state()) {
            let _ = self.write_state(MotorState::Off);
            return Err(e.into());
        }

        let started = Instant::now();
        let poll = self.motion.poll();
        loop {
            let left = duration.saturating_sub(started.elapsed());
            if left.is_zero() {
                break;
            }
            sleep(poll.min(left)).await;
        }

        self.write_state(MotorState::Off)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockGpio, MockSensor, SimulatedShaft};

    const PINS: MotorPins = MotorPins::new(3, 4);

    fn mock_motor(degrees: f32) -> (MotorController<MockSensor, MockGpio>, MockSensor, MockGpio) {
        let sensor = MockSensor::new(degrees);
        let gpio = MockGpio::new();
        let motor = MotorController::new("top", sensor.clone(), gpio.clone(), PINS, 3).unwrap();
        (motor, sensor, gpio)
    }

    fn shaft_motor(angle: f32) -> (MotorController<SimulatedShaft, SimulatedShaft>, SimulatedShaft) {
        let shaft = SimulatedShaft::new(PINS).with_angle(angle);
        let motor = MotorController::new("top", shaft.clone(), shaft.clone(), PINS, 3).unwrap();
        (motor, shaft)
    }

    // =========================================================================
    // Path planning
    // =========================================================================

    #[test]
    fn shortest_path_prefers_reverse_across_zero() {
        let plan = shortest_path(10.0, 200.0);
        assert_eq!(plan.rotation, Rotation::Reverse);
        assert_eq!(plan.degrees, 170.0);
    }

    #[test]
    fn shortest_path_forward_across_zero() {
        let plan = shortest_path(350.0, 120.0);
        assert_eq!(plan.rotation, Rotation::Forward);
        assert_eq!(plan.degrees, 130.0);
    }

    #[test]
    fn shortest_path_direct() {
        assert_eq!(
            shortest_path(0.0, 120.0),
            PathPlan {
                degrees: 120.0,
                rotation: Rotation::Forward
            }
        );
        assert_eq!(
            shortest_path(240.0, 120.0),
            PathPlan {
                degrees: 120.0,
                rotation: Rotation::Reverse
            }
        );
    }

    #[test]
    fn circular_distance_wraps() {
        assert_eq!(circular_distance(350.0, 10.0), 20.0);
        assert_eq!(circular_distance(10.0, 350.0), 20.0);
        assert_eq!(circular_distance(0.0, 180.0), 180.0);
    }

    #[test]
    fn approaching_when_distance_shrinks() {
        assert!(still_approaching(0.0, 120.0, 30.0, 36.0, Rotation::Forward));
        assert!(!still_approaching(0.0, 120.0, 120.0, 126.0, Rotation::Forward));
        assert!(!still_approaching(0.0, 120.0, 30.0, 30.0, Rotation::Forward));
    }

    #[test]
    fn approaching_until_wrap_is_crossed() {
        // forward from 350 to 120, shaft still short of 0°
        assert!(still_approaching(350.0, 120.0, 355.0, 355.0, Rotation::Forward));
        // reverse from 10 to 200, shaft still above 0°
        assert!(still_approaching(10.0, 200.0, 5.0, 5.0, Rotation::Reverse));
        // clause never applies without a wrap
        assert!(!still_approaching(0.0, 120.0, 10.0, 10.0, Rotation::Forward));
    }

    // =========================================================================
    // Controller
    // =========================================================================

    #[test]
    fn new_drives_outputs_off() {
        let (motor, _, gpio) = mock_motor(0.0);
        assert_eq!(motor.state(), MotorState::Off);
        assert_eq!(gpio.level(3), Some(PinState::Low));
        assert_eq!(gpio.level(4), Some(PinState::Low));
    }

    #[test]
    fn zero_bins_rejected() {
        let err = MotorController::new("top", MockSensor::new(0.0), MockGpio::new(), PINS, 0)
            .unwrap_err();
        assert!(matches!(err, ControlError::Configuration(_)));
    }

    #[test]
    fn shared_pin_rejected() {
        let err = MotorController::new(
            "top",
            MockSensor::new(0.0),
            MockGpio::new(),
            MotorPins::new(5, 5),
            3,
        )
        .unwrap_err();
        assert!(matches!(err, ControlError::Configuration(_)));
    }

    #[test]
    fn bin_locations() {
        let (motor, _, _) = mock_motor(0.0);
        assert_eq!(motor.get_bin_location(0), 0.0);
        assert_eq!(motor.get_bin_location(1), 120.0);
        assert_eq!(motor.get_bin_location(2), 240.0);
    }

    #[test]
    fn state_changes_write_low_side_first() {
        let (mut motor, _, gpio) = mock_motor(0.0);
        motor.set_state(MotorState::Forward).unwrap();
        motor.set_state(MotorState::Reverse).unwrap();
        let writes = gpio.writes();
        assert_eq!(
            &writes[2..],
            &[
                (4, PinState::Low),
                (3, PinState::High),
                (3, PinState::Low),
                (4, PinState::High),
            ]
        );
        assert_eq!(gpio.motor_state(PINS), MotorState::Reverse);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_bin_is_rejected() {
        let (mut motor, _, gpio) = mock_motor(0.0);
        let writes = gpio.write_count();
        let err = motor.move_to_bin(3).await.unwrap_err();
        assert_eq!(err, ControlError::BinOutOfRange { bin: 3, num_bins: 3 });
        assert_eq!(gpio.write_count(), writes);
    }

    #[tokio::test(start_paused = true)]
    async fn current_bin_is_a_no_op() {
        let (mut motor, sensor, gpio) = mock_motor(0.0);
        let writes = gpio.write_count();
        motor.move_to_bin(0).await.unwrap();
        assert_eq!(gpio.write_count(), writes);
        assert_eq!(sensor.read_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn move_seconds_runs_then_stops() {
        let (mut motor, _, gpio) = mock_motor(0.0);
        let start = Instant::now();
        motor
            .move_seconds(Duration::from_millis(250), Rotation::Forward)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(start.elapsed() < Duration::from_millis(260));
        assert_eq!(motor.state(), MotorState::Off);
        assert_eq!(gpio.motor_state(PINS), MotorState::Off);
        assert!(gpio.writes().contains(&(3, PinState::High)));
    }

    #[tokio::test]
    async fn move_seconds_tolerates_clock_passing_the_deadline() {
        // real clock: the deadline can expire between loop checks
        let (mut motor, _, gpio) = mock_motor(0.0);
        for ns in (0..3000u64).step_by(7) {
            motor
                .move_seconds(Duration::from_nanos(ns), Rotation::Forward)
                .await
                .unwrap();
            assert_eq!(motor.state(), MotorState::Off);
        }
        assert_eq!(gpio.motor_state(PINS), MotorState::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn move_to_bin_converges() {
        let (mut motor, shaft) = shaft_motor(0.0);
        motor.move_to_bin(1).await.unwrap();
        assert_eq!(motor.current_bin(), 1);
        assert!(circular_distance(shaft.angle(), 120.0) < 10.0);
        assert_eq!(shaft.state(), MotorState::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn move_to_bin_takes_reverse_across_zero() {
        let (mut motor, shaft) = shaft_motor(0.0);
        motor.move_to_bin(2).await.unwrap();
        assert!(circular_distance(shaft.angle(), 240.0) < 10.0);
        // never went the long way through 120°
        assert!(shaft.angle() > 180.0);
    }

    #[tokio::test(start_paused = true)]
    async fn reversed_move_stops_quickly() {
        let shaft = SimulatedShaft::new(PINS).with_speed(-60.0);
        let mut motor = MotorController::new("top", shaft.clone(), shaft.clone(), PINS, 3).unwrap();
        let start = Instant::now();
        motor.move_degrees(120.0, Rotation::Forward).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(510));
    }

    #[tokio::test(start_paused = true)]
    async fn jammed_wrap_move_times_out() {
        let shaft = SimulatedShaft::new(PINS).with_angle(350.0).with_jam_at(355.0);
        let mut motor = MotorController::new("top", shaft.clone(), shaft.clone(), PINS, 3)
            .unwrap()
            .with_motion(MotionConfig::default().with_max_move_ms(3_000));

        let err = motor.move_to_bin(1).await.unwrap_err();
        assert_eq!(err, ControlError::MoveTimeout(Duration::from_secs(3)));
        assert_eq!(motor.current_bin(), 0);
        assert_eq!(shaft.state(), MotorState::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_failure_leaves_bin_unchanged() {
        let (mut motor, sensor, _) = mock_motor(0.0);
        sensor.fail_reads(true);
        let err = motor.move_to_bin(1).await.unwrap_err();
        assert!(matches!(err, ControlError::Hardware(HardwareError::Driver(_))));
        assert_eq!(motor.current_bin(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn output_failure_is_a_hardware_error() {
        let (mut motor, _, gpio) = mock_motor(0.0);
        gpio.fail_writes(true);
        let err = motor
            .move_seconds(Duration::from_millis(100), Rotation::Reverse)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Hardware(_)));
    }
}
