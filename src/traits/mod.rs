//! Trait definitions for hardware and network abstraction.
//!
//! This module defines the seams that allow the lid controller to:
//! - Run on different boards (Raspberry Pi, desktop simulation, test mocks)
//! - Swap position sensors (rotary encoder, resistor divider)
//! - Talk to the server over any framed text transport
//!
//! # Submodules
//!
//! - `hardware`: Digital outputs, interrupts, analog input, position sensing
//! - `network`: Connector and command channel traits
//!
//! # Hardware Abstraction
//!
//! The key hardware traits are:
//!
//! - [`DigitalOutputs`]: Motor enable lines
//! - [`InterruptSource`]: Debounced edge interrupts for pedals and encoders
//! - [`AnalogInput`]: ADC reads for the resistor divider
//! - [`PositionSensor`]: Shaft angle in degrees

pub mod hardware;
pub mod network;

pub use hardware::*;
pub use network::*;
