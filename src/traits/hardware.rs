//! Hardware abstraction traits for motor outputs, interrupts, analog input and
//! position sensing.
//!
//! The controller never talks to a GPIO library directly. Everything it needs
//! from the board goes through these capability traits, so the same motion
//! code runs against the Raspberry Pi binding, the desktop simulation and the
//! test mocks.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`DigitalOutputs`] | `write_output(pin, level)` for motor enable lines |
//! | [`InterruptSource`] | `register_interrupt(pin, edge, debounce_ms, callback)` |
//! | [`AnalogInput`] | `read_analog(channel)` for the resistor divider |
//! | [`Platform`] | All three, plus a release hook for shutdown |
//! | [`PositionSensor`] | Current shaft angle in degrees |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations from
//! [`crate::hal::mock`]. For a Raspberry Pi, use `hal::rpi` (requires the
//! `rpi` feature).
//!
//! # Example
//!
//! ```rust
//! use smart_can::traits::{DigitalOutputs, PinState};
//! use smart_can::hal::MockGpio;
//!
//! let gpio = MockGpio::new();
//! gpio.write_output(5, PinState::High).unwrap();
//! assert_eq!(gpio.level(5), Some(PinState::High));
//! ```

use crate::error::HardwareError;

pub use embedded_hal::digital::PinState;

/// Drive state of a two-wire DC motor.
///
/// Each state maps to exactly one pair of output levels:
///
/// | State | forward pin | reverse pin |
/// |-------|-------------|-------------|
/// | [`Off`](Self::Off) | low | low |
/// | [`Forward`](Self::Forward) | high | low |
/// | [`Reverse`](Self::Reverse) | low | high |
///
/// Both-low is the only OFF encoding this crate ever writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorState {
    /// Motor unpowered.
    #[default]
    Off,
    /// Rotating towards increasing angles.
    Forward,
    /// Rotating towards decreasing angles.
    Reverse,
}

impl MotorState {
    /// Output levels as `(forward_pin, reverse_pin)`.
    #[inline]
    pub const fn levels(self) -> (PinState, PinState) {
        match self {
            MotorState::Off => (PinState::Low, PinState::Low),
            MotorState::Forward => (PinState::High, PinState::Low),
            MotorState::Reverse => (PinState::Low, PinState::High),
        }
    }

    /// Decode a pair of output levels.
    ///
    /// Both-high is not an encoding this crate produces; it decodes to
    /// [`Off`](Self::Off) because an H-bridge with both inputs high brakes.
    pub const fn from_levels(forward: PinState, reverse: PinState) -> Self {
        match (forward, reverse) {
            (PinState::High, PinState::Low) => MotorState::Forward,
            (PinState::Low, PinState::High) => MotorState::Reverse,
            _ => MotorState::Off,
        }
    }

    /// Returns the state as a lowercase string.
    ///
    /// ```
    /// use smart_can::MotorState;
    ///
    /// assert_eq!(MotorState::Forward.as_str(), "forward");
    /// assert_eq!(MotorState::Off.as_str(), "off");
    /// ```
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MotorState::Off => "off",
            MotorState::Forward => "forward",
            MotorState::Reverse => "reverse",
        }
    }
}

/// Signal edge an interrupt fires on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    /// Low to high transition.
    Rising,
    /// High to low transition.
    Falling,
    /// Either transition.
    Both,
}

impl Edge {
    /// Returns true if an observed transition satisfies this registration.
    #[inline]
    pub fn matches(self, observed: Edge) -> bool {
        self == Edge::Both || observed == Edge::Both || self == observed
    }
}

/// Callback invoked from interrupt context.
///
/// Runs on a driver thread, never on the scheduler. It must only perform a
/// thread-safe handoff (atomic update, channel send).
pub type InterruptCallback = Box<dyn FnMut() + Send + 'static>;

/// Digital output lines.
///
/// Implementations are cheap handles onto shared driver state, so the trait
/// takes `&self`.
pub trait DigitalOutputs {
    /// Drive `pin` to `level`, configuring it as an output on first use.
    fn write_output(&self, pin: u8, level: PinState) -> Result<(), HardwareError>;
}

/// Edge-triggered interrupts with driver-level debounce.
pub trait InterruptSource {
    /// Register `callback` for `edge` transitions on `pin`.
    ///
    /// Events closer than `debounce_ms` to the previously accepted event are
    /// discarded by the driver. `0` disables debouncing.
    fn register_interrupt(
        &self,
        pin: u8,
        edge: Edge,
        debounce_ms: u32,
        callback: InterruptCallback,
    ) -> Result<(), HardwareError>;
}

/// Analog-to-digital converter input.
pub trait AnalogInput {
    /// Read the raw converter value of `channel`.
    fn read_analog(&self, channel: u8) -> Result<u16, HardwareError>;
}

/// A complete board binding.
///
/// The one-time pin setup lives inside the implementation; [`release`] undoes
/// it. Wrap the platform in a [`HardwareSession`](crate::hal::HardwareSession)
/// so release runs on every exit path.
///
/// [`release`]: Platform::release
pub trait Platform: DigitalOutputs + InterruptSource + AnalogInput {
    /// Drive every configured output low and detach all interrupts.
    fn release(&self);
}

/// Reports the angular position of a shaft.
///
/// Two implementations ship with the crate:
///
/// - [`RotaryEncoder`](crate::sensors::RotaryEncoder): interrupt-counted
///   incremental position, needs calibration.
/// - [`ResistorReader`](crate::sensors::ResistorReader): absolute position
///   from a resistor divider on an ADC channel.
pub trait PositionSensor {
    /// Current angle in degrees, within `[0, 360)`.
    fn read_degrees(&self) -> Result<f32, HardwareError>;
}

impl<T: PositionSensor + ?Sized> PositionSensor for Box<T> {
    fn read_degrees(&self) -> Result<f32, HardwareError> {
        (**self).read_degrees()
    }
}

impl<T: DigitalOutputs + ?Sized> DigitalOutputs for Box<T> {
    fn write_output(&self, pin: u8, level: PinState) -> Result<(), HardwareError> {
        (**self).write_output(pin, level)
    }
}
