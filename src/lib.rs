//! # smart-can
//!
//! Lid controller for a multi-bin smart waste receptacle. Two motors turn a
//! two-layer lid so that its opening lines up with the bin for the selected
//! disposal category, hold it open, then close it again.
//!
//! ## Features
//!
//! - **Hardware abstraction**: Traits for motor outputs, edge interrupts, ADC input and position sensing
//! - **Two position sensors**: Interrupt-counted rotary encoder or resistor ladder on an ADC
//! - **Serialized motion**: One FIFO queue, one consumer, one physical move at a time
//! - **Two command sources**: Server `rotate` commands over a websocket and local foot pedals
//! - **Self-healing connection**: Reconnect with capped exponential backoff
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware and network abstractions
//! - `sensors` - Rotary encoder and resistor-ladder position sensors
//! - `motor` - Single motor bin positioning
//! - `lid` - Two-motor open/close coordination
//! - `queue` - Move queue and its consumer
//! - `services` - Connection manager and pedal bridge
//! - `hal` - Concrete implementations (mock and simulation for testing, rpi for hardware)
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use smart_can::{
//!     hal::SimulatedShaft, queue::{move_queue, MoveConsumer},
//!     CommandSource, LidController, MotorController, MotorPins,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().start_paused(true).build().unwrap().block_on(async {
//! let top_pins = MotorPins::new(3, 4);
//! let bottom_pins = MotorPins::new(27, 22);
//! let top = SimulatedShaft::new(top_pins);
//! let bottom = SimulatedShaft::new(bottom_pins);
//!
//! let lid = LidController::new(
//!     MotorController::new("top", top.clone(), top.clone(), top_pins, 3).unwrap(),
//!     MotorController::new("bottom", bottom.clone(), bottom, bottom_pins, 3).unwrap(),
//! ).unwrap();
//!
//! let (queue, receiver) = move_queue();
//! let mut consumer = MoveConsumer::new(lid, receiver).with_dwell(Duration::from_secs(1));
//!
//! queue.push(1, CommandSource::Pedal).unwrap();
//! drop(queue);
//! consumer.run().await;
//!
//! assert_eq!(consumer.lid().top().current_bin(), 1);
//! assert_eq!(consumer.lid().bottom().current_bin(), 0);
//! # });
//! ```

#![warn(missing_docs)]

/// Move requests, sources and outcomes.
pub mod commands;
/// Controller configuration and device credentials.
pub mod config;
/// Error types.
pub mod error;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Two-motor lid coordination.
pub mod lid;
/// Server wire messages.
pub mod messages;
/// Single motor bin positioning.
pub mod motor;
/// Move queue and consumer.
pub mod queue;
/// Position sensors.
pub mod sensors;
/// Connection manager, pedal bridge and websocket transport.
pub mod services;
/// Hardware and network abstraction traits.
pub mod traits;

pub use commands::{CommandSource, MoveOutcome, MoveRequest};
pub use config::{Config, DeviceCredentials, MotorPins};
pub use error::{ConfigError, ConnectionError, ControlError, HardwareError, ProtocolError, QueueClosed};
pub use lid::LidController;
pub use motor::{MotorController, Rotation};
pub use queue::{move_queue, MoveConsumer, MoveQueue, MoveReceiver};
pub use traits::MotorState;
