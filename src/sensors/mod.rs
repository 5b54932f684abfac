//! Position sensors.
//!
//! Both sensors implement [`PositionSensor`](crate::traits::PositionSensor)
//! and are picked once at startup from
//! [`SensorConfig::kind`](crate::config::SensorConfig).
//!
//! | Sensor | Source | Calibration |
//! |--------|--------|-------------|
//! | [`RotaryEncoder`] | Edge interrupts on two pins | Once, interactively |
//! | [`ResistorReader`] | One ADC channel | None |

mod encoder;
mod resistor;

pub use encoder::{AlignmentPrompt, RotaryEncoder, StdinPrompt};
pub use resistor::{ResistorReader, MAX_SAMPLES};
